use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, EngineError>;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Audio, image or video failed to load. Never fatal to a render tick.
    #[error("failed to decode asset '{source_id}': {reason}")]
    AssetDecode { source_id: String, reason: String },

    /// Batch start attempted with queue rows that have no audio bound.
    #[error("queue rows without audio: {}", format_indices(.missing))]
    Validation { missing: Vec<usize> },

    /// None of the requested container/codec pairs can be encoded on this host.
    #[error("no supported recording format (tried: {})", .tried.join(", "))]
    Capability { tried: Vec<String> },

    #[error("malformed subtitle line {line}: {reason}")]
    SubtitleParse { line: usize, reason: String },

    #[error("encoder write failed: {0}")]
    EncoderWrite(String),

    #[error("recording session is {0}")]
    SessionState(&'static str),

    #[error("queue is full ({0} rows max)")]
    QueueFull(usize),

    #[error("queue row {0} does not exist")]
    NoSuchRow(usize),

    #[error("file not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl EngineError {
    pub fn asset(source_id: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self::AssetDecode {
            source_id: source_id.into(),
            reason: reason.to_string(),
        }
    }

    /// Errors the caller must surface as a blocking message.
    pub fn is_blocking(&self) -> bool {
        matches!(self, Self::Validation { .. } | Self::Capability { .. })
    }
}

fn format_indices(indices: &[usize]) -> String {
    indices
        .iter()
        .map(|i| i.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_message_lists_indices() {
        let err = EngineError::Validation { missing: vec![1, 3] };
        assert_eq!(err.to_string(), "queue rows without audio: 1, 3");
        assert!(err.is_blocking());
    }

    #[test]
    fn asset_errors_are_not_blocking() {
        let err = EngineError::asset("cover.png", "truncated");
        assert!(!err.is_blocking());
        assert!(err.to_string().contains("cover.png"));
    }
}
