use hapbridge_traits::DeviceHandle;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HwError {
    #[error("tracking runtime call timed out")]
    Timeout,
    #[error("unknown device handle {0}")]
    UnknownDevice(DeviceHandle),
    #[error("tracking runtime unavailable: {0}")]
    Unavailable(String),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, HwError>;
