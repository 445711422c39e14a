use std::time::Duration;

/// Result alias used across the crate.
pub type ReelmarkResult<T> = Result<T, ReelmarkError>;

/// Every way a processing run can fail.
///
/// All variants are local to one run: the pipeline is ready for a fresh run after any of them.
#[derive(thiserror::Error, Debug)]
pub enum ReelmarkError {
    /// The source video could not be opened or decoded.
    #[error("media load error: {0}")]
    MediaLoad(String),

    /// The logo image could not be decoded.
    #[error("image load error: {0}")]
    ImageLoad(String),

    /// The source raised an error while playing.
    #[error("playback error: {0}")]
    Playback(String),

    /// The encoder signalled an internal error.
    #[error("encoder error: {0}")]
    Encoder(String),

    /// The encoder finalized without producing any bytes.
    #[error("encoder produced an empty output for '{mime_type}'")]
    EmptyOutput {
        /// Negotiated mime type of the empty output.
        mime_type: String,
    },

    /// The run did not resolve within the source duration plus the safety margin.
    #[error("run did not finish within {limit:?}")]
    Timeout {
        /// Run-time limit that was exceeded.
        limit: Duration,
    },

    /// Caller-supplied settings are outside the documented ranges.
    #[error("validation error: {0}")]
    Validation(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ReelmarkError {
    pub fn media_load(msg: impl Into<String>) -> Self {
        Self::MediaLoad(msg.into())
    }

    pub fn image_load(msg: impl Into<String>) -> Self {
        Self::ImageLoad(msg.into())
    }

    pub fn playback(msg: impl Into<String>) -> Self {
        Self::Playback(msg.into())
    }

    pub fn encoder(msg: impl Into<String>) -> Self {
        Self::Encoder(msg.into())
    }

    pub fn empty_output(mime_type: impl Into<String>) -> Self {
        Self::EmptyOutput {
            mime_type: mime_type.into(),
        }
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/error.rs"]
mod tests;
