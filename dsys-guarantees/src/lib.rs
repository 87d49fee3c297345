//! Four delivery guarantees over an unreliable link (spec §4.1).

pub mod receiver;
pub mod sender;

pub use receiver::Receiver;
pub use sender::Sender;

/// Default time the sender waits for a matching echo before retransmitting (spec §4.1).
pub const DEFAULT_ECHO_TIMEOUT: std::time::Duration = std::time::Duration::from_millis(500);
