use thiserror::Error;

/// Failure modes of window selection and profile bounding.
///
/// None of these are fatal for a batch: a gap or a thin data set only means
/// that no profile is available for one (borehole, layer, channel) key.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProfileError {
    /// The query depth itself sits at the start of a hole in the sounding.
    #[error("depth {depth} m falls in a data gap")]
    Gap { depth: f64 },

    /// Too few valid samples or a degenerate numeric state.
    #[error("insufficient data: {reason}")]
    InsufficientData { reason: String },

    /// No layer of the borehole encloses the query depth.
    #[error("no layer contains depth {depth} m")]
    NoLayer { depth: f64 },

    /// The sounding does not record the requested channel.
    #[error("unknown channel {channel:?}")]
    UnknownChannel { channel: String },

    /// Unsupported quantile or model name.
    #[error("invalid configuration: {reason}")]
    InvalidConfiguration { reason: String },
}

impl ProfileError {
    pub(crate) fn insufficient(reason: impl Into<String>) -> Self {
        Self::InsufficientData {
            reason: reason.into(),
        }
    }

    pub(crate) fn invalid(reason: impl Into<String>) -> Self {
        Self::InvalidConfiguration {
            reason: reason.into(),
        }
    }
}
