use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug, Clone)]
pub enum Error {
    #[error("batch policy must have at least one active trigger")]
    PolicyHasNoTriggers,

    #[error("failed to parse period - {0}")]
    BadPeriod(String),

    #[error("failed to parse check - {0}")]
    BadCheck(String),

    #[error("failed to construct processor - {0}")]
    BadProcessor(String),

    #[error("Processor Error - {0}")]
    Processor(String),

    #[error("Check Error - {0}")]
    Check(String),

    #[error("Sink Error - {0}")]
    Sink(String),

    #[error("Shutdown Error - {0}")]
    Shutdown(String),

    #[error("Metrics Error - {0}")]
    Metrics(String),
}
