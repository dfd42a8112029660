pub mod calls;
pub mod config;
pub mod presence;
pub mod socket;
pub mod types;

#[cfg(test)]
pub mod test_utils;

pub use calls::{CallContext, CallError, CallHandle, CallManager};
pub use config::CallConfig;
