use thiserror::Error;
#[derive(Debug, Error)]
pub enum GloveError {
    #[error("malformed payload: {0}")]
    Decode(String),
    #[error("channel count mismatch: expected {expected}, got {actual}")]
    ShapeMismatch { expected: usize, actual: usize },
    #[error("no glove matching {0:?} was found")]
    SourceNotFound(String),
    #[error("glove link closed: {0}")]
    SourceDisconnected(String),
    #[error("serial port error: {0}")]
    Serial(#[from] serialport::Error),
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("failed to persist sample after retry: {0}")]
    Persist(String),
    #[error("calibration fit failed: {0}")]
    CalibrationFit(String),
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("failed to render plot: {0}")]
    Plot(String),
}
impl GloveError {
    /// Errors worth another discovery attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            GloveError::SourceNotFound(_)
                | GloveError::SourceDisconnected(_)
                | GloveError::Serial(_)
                | GloveError::Io(_)
        )
    }
}
impl<E: std::error::Error + Send + Sync + 'static> From<plotters::drawing::DrawingAreaErrorKind<E>>
    for GloveError
{
    fn from(value: plotters::drawing::DrawingAreaErrorKind<E>) -> Self {
        GloveError::Plot(format!("{value:?}"))
    }
}
impl From<image::ImageError> for GloveError {
    fn from(value: image::ImageError) -> Self {
        GloveError::Plot(value.to_string())
    }
}
