use thiserror::Error;

/// Errors raised while validating a plan request or loading planning configuration.
///
/// The funding formulas themselves never fail; every variant here describes an
/// input that was rejected before it reached them.
#[derive(Debug, Error)]
pub enum PlanError {
    #[error("child age {age} is outside the supported range 0..={max}")]
    AgeOutOfRange { age: i64, max: u32 },

    #[error("at most {max} children can be planned at once, got {count}")]
    TooManyChildren { count: usize, max: usize },

    #[error("unknown country: {0}")]
    UnknownCountry(String),

    #[error("hybrid initial investment must be a finite amount >= 0, got {0}")]
    InvalidHybridInitial(f64),

    #[error("invalid assumption: {0}")]
    InvalidAssumption(String),

    #[error("invalid cost table: {0}")]
    InvalidCostTable(String),

    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl PlanError {
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// True for errors caused by the caller's plan inputs rather than by configuration files.
    pub fn is_invalid_input(&self) -> bool {
        matches!(
            self,
            Self::AgeOutOfRange { .. }
                | Self::TooManyChildren { .. }
                | Self::UnknownCountry(_)
                | Self::InvalidHybridInitial(_)
                | Self::InvalidAssumption(_)
        )
    }
}

pub type PlanResult<T> = Result<T, PlanError>;
