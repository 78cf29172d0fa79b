use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("bluetooth: {0}")]
    Bluetooth(#[from] btleplug::Error),
    #[error("no bluetooth adapter found")]
    NoAdapter,
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid config: {0}")]
    ConfigParse(#[from] toml::de::Error),
    #[error("invalid config: {0}")]
    Config(String),
    #[error("slot {0} is outside 1..=8")]
    InvalidSlot(u8),
    #[error("logger: {0}")]
    Logger(#[from] flexi_logger::FlexiLoggerError),
}
