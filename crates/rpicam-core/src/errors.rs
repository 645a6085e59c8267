/// Core error type.
///
/// Adapter crates map their specific errors into this type so the dispatcher
/// can log every failure the same way regardless of which collaborator raised it.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("capture failed: {0}")]
    Capture(String),

    #[error("delivery failed: {0}")]
    Delivery(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("external error: {0}")]
    External(String),
}

pub type Result<T> = std::result::Result<T, Error>;
