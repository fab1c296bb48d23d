use async_trait::async_trait;
use rin_core::CouponMessage;
use thiserror::Error;

/// Why a message was not delivered.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DeliveryError {
    /// May succeed on a later attempt (network failure, 429, 5xx).
    #[error("transient delivery failure: {0}")]
    Transient(String),
    /// The channel refused this message; retrying will not help.
    #[error("delivery rejected: {0}")]
    Rejected(String),
}

/// An outbound messaging channel.
#[async_trait]
pub trait MessageSink: Send + Sync {
    async fn send(&self, message: &CouponMessage) -> Result<(), DeliveryError>;
}
