use thiserror::Error;

use crate::shared::PrefixOrigin;

#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error("malformed prefix {input:?}: {reason}")]
    MalformedPrefix { input: String, reason: String },

    #[error("ASN {0} is outside the 32-bit range")]
    AsnOutOfRange(i64),

    #[error("max length {max_length} is invalid for {prefix}")]
    InvalidMaxLength { prefix: String, max_length: i64 },

    #[error("timestamp {0} cannot be represented as a UTC date-time")]
    TimestampOutOfRange(i64),

    #[error("hijack event names a victim prefix or ASN but not both")]
    IncompleteVictim,

    /// Downstream ordering depends on exactly five states; never recovered.
    #[error("undefined validity ordinal {0}")]
    UndefinedValidity(u8),

    #[error("no validity recorded for {0}")]
    MissingValidity(PrefixOrigin),

    #[error("partition {partition} failed: {source}")]
    PartitionFailed {
        partition: String,
        #[source]
        source: Box<AnalysisError>,
    },

    #[error("could not build worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    #[error("route selection failed: {0}")]
    RouteSelection(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl AnalysisError {
    /// Record-level problems are skipped and counted; everything else aborts
    /// the run.
    pub fn is_record_error(&self) -> bool {
        matches!(
            self,
            AnalysisError::MalformedPrefix { .. }
                | AnalysisError::AsnOutOfRange(_)
                | AnalysisError::InvalidMaxLength { .. }
                | AnalysisError::TimestampOutOfRange(_)
                | AnalysisError::IncompleteVictim
        )
    }
}

pub type Result<T> = std::result::Result<T, AnalysisError>;
