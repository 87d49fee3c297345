use thiserror::Error;

#[derive(Debug, Error)]
pub enum RpcError {
    #[error("response timeout")]
    Timeout,
    #[error("{0}")]
    Remote(String),
    #[error("malformed request: {0}")]
    Malformed(String),
}
