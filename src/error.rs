use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProjectionError {
    #[error("Invalid configuration field '{field}': {details}")]
    InvalidConfig { field: String, details: String },

    #[error("Cash conservation broken in period {period}: expected {expected:.2}, found {actual:.2}")]
    CashConservationViolation {
        period: u32,
        expected: f64,
        actual: f64,
    },

    #[error("Cumulative profit mismatch in period {period}: expected {expected:.2}, found {actual:.2}")]
    ProfitIdentityViolation {
        period: u32,
        expected: f64,
        actual: f64,
    },

    #[error("Unit accounting broken in period {period}: {details}")]
    UnitAccountingViolation { period: u32, details: String },

    #[error("Outcome shape mismatch: {0}")]
    OutcomeShape(String),

    #[error("Malformed stream chunk: {0}")]
    StreamDecode(String),

    #[error("Analysis request failed: {0}")]
    AnalysisFailed(String),

    #[error("Invalid growth rate '{0}'")]
    InvalidGrowthRate(String),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[cfg(feature = "gemini")]
    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),
}

impl ProjectionError {
    /// Network and stream failures can be retried by issuing a new request.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::StreamDecode(_) | Self::AnalysisFailed(_) | Self::IoError(_) => true,
            #[cfg(feature = "gemini")]
            Self::HttpError(_) => true,
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, ProjectionError>;
