use thiserror::Error;

use crate::address::AddressParseError;

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("address: {0}")]
    Address(#[from] AddressParseError),
    #[error("encoding error: {0}")]
    Encoding(#[from] serde_json::Error),
    #[error("mailbox closed")]
    MailboxClosed,
}

pub type Result<T> = std::result::Result<T, RuntimeError>;
