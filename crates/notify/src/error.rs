use thiserror::Error;

/// Errors that can occur while delivering a notification.
#[derive(Debug, Error)]
pub enum NotifyError {
    /// The target device token is empty.
    #[error("Device token is empty")]
    EmptyDeviceToken,

    /// Nothing is connected to carry device pushes.
    #[error("No push gateway connected")]
    NoPushGateway,

    /// The transport rejected the message.
    #[error("Delivery failed: {0}")]
    Delivery(String),
}

pub type Result<T> = std::result::Result<T, NotifyError>;
