//! Error types for RathIO

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// RathIO error types
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// I2C bus error from the hardware driver
    #[cfg(feature = "hardware")]
    #[error("I2C error: {0}")]
    I2c(#[from] rppal::i2c::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration file could not be parsed
    #[error("Config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    /// Configuration is well-formed but semantically invalid
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// JSON encode/decode error on the command channel
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Transaction failed on the bus (NACK, arbitration loss, injected fault)
    #[error("Bus transaction failed at {address:#04x}: {reason}")]
    Bus {
        /// Target device address
        address: u16,
        /// Human readable cause
        reason: String,
    },

    /// Read block shorter than the layout requires
    #[error("Invalid frame: expected {expected} bytes, got {actual}")]
    InvalidFrame {
        /// Required length
        expected: usize,
        /// Received length
        actual: usize,
    },

    /// Invalid parameter
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// Worker channel closed (arbiter or service already shut down)
    #[error("Channel closed: {0}")]
    ChannelClosed(&'static str),

    /// Thread panicked
    #[error("Thread panicked")]
    ThreadPanic,

    /// Generic error with message
    #[error("{0}")]
    Other(String),
}
