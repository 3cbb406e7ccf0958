use thiserror::Error;

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Runtime error: {0}")]
    Runtime(#[from] core_runtime::Error),

    #[error("Offline cache error: {0}")]
    Offline(#[from] core_offline::OfflineError),

    #[error("Bridge error: {0}")]
    Bridge(#[from] bridge_traits::BridgeError),
}

pub type Result<T> = std::result::Result<T, ServiceError>;
