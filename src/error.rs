use thiserror::Error;

#[derive(Error, Debug)]
pub enum ModemError {
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Resampler configuration error: {0}")]
    ResamplerConfig(String),

    #[error("Filter design failed: {0}")]
    FilterDesign(String),

    #[error("Shared memory error: {0}")]
    SharedMemory(String),

    #[error("Frontend error: {0}")]
    Frontend(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("WAV error: {0}")]
    Wav(#[from] hound::Error),
}

pub type Result<T> = std::result::Result<T, ModemError>;
