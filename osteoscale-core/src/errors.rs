use thiserror::Error;

/// Error type for invalid operations.
#[derive(Error, Debug)]
pub enum OsteoscaleError {
    #[error("{0}")]
    Error(String),
    #[error("malformed XML at byte {position}: {message}")]
    MalformedXml { position: usize, message: String },
    #[error("attribute '{attribute}' has malformed value '{value}'")]
    MalformedAttribute { attribute: String, value: String },
    #[error("landmark site '{site}' for segment '{segment}' not found in the model")]
    MissingLandmark { site: String, segment: String },
    #[error("segment '{segment}' has zero rest-pose length, cannot derive a scale ratio")]
    DegenerateSegment { segment: String },
    #[error("body '{0}' not found in the model")]
    MissingBody(String),
    #[error("qpos frame {frame} has {got} entries, expected {expected}")]
    QposLayout {
        frame: usize,
        expected: usize,
        got: usize,
    },
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("serialization failed: {0}")]
    Serialization(String),
}

/// Convenience type for `Result<T, OsteoscaleError>`.
pub type OsteoscaleResult<T> = Result<T, OsteoscaleError>;
