//! Call-related error types.

use crate::types::call::UserId;
use thiserror::Error;

pub use super::media::DeviceError;

#[derive(Debug, Error)]
pub enum CallError {
    /// Capture unavailable or denied. Aborts the call attempt.
    #[error("media device error: {0}")]
    Device(#[from] DeviceError),

    /// Counterparty is not online; nothing was acquired.
    #[error("user {0} is not reachable")]
    TargetUnreachable(UserId),

    /// The peer connection reported a failure.
    #[error("negotiation failed: {0}")]
    Negotiation(String),

    /// A signal arrived out of order. Recovered silently.
    #[error("out-of-order signal: {0}")]
    ProtocolRace(String),

    #[error("invalid call state transition: {0}")]
    InvalidTransition(#[from] super::state::InvalidTransition),

    #[error("another call is already in progress")]
    Busy,

    #[error("signaling error: {0}")]
    Signaling(String),

    /// The session actor has shut down.
    #[error("call manager is closed")]
    Closed,
}
