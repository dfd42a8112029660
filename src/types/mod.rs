pub mod call;
pub mod events;

pub use call::{CallStatus, CallType, Contact, UserId, format_duration};
pub use events::{LogNoticeSink, Notice, NoticeBus, NoticeLevel, NoticeSink};
