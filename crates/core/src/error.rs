/// Result alias that carries the custom [`VisualizerError`] type.
pub type Result<T> = std::result::Result<T, VisualizerError>;

/// Common error type for the core crate.
#[derive(Debug, thiserror::Error)]
pub enum VisualizerError {
    /// Free-form failure that does not fit one of the specific variants.
    #[error("{0}")]
    Message(String),
    /// The capture device could not be opened, configured or enabled.
    #[error("capture error: {0}")]
    Capture(String),
    /// A listener refused to create its view.
    #[error("listener error: {0}")]
    Listener(String),
    /// A shared lock was poisoned by a panicking holder.
    #[error("{0} has been poisoned")]
    Poisoned(&'static str),
    /// Wrapper around standard IO errors.
    #[error("{0}")]
    Io(#[from] std::io::Error),
    /// Preference files that fail to parse.
    #[error("invalid preferences: {0}")]
    Json(#[from] serde_json::Error),
    /// Artwork that could not be read or decoded.
    #[error("invalid artwork: {0}")]
    Image(#[from] image::ImageError),
}

impl VisualizerError {
    /// Creates a new error that simply wraps the provided message.
    pub fn msg<T: Into<String>>(msg: T) -> Self {
        Self::Message(msg.into())
    }

    /// Creates a capture error from anything printable.
    pub fn capture<T: Into<String>>(msg: T) -> Self {
        Self::Capture(msg.into())
    }
}

impl From<&str> for VisualizerError {
    fn from(value: &str) -> Self {
        Self::msg(value)
    }
}

impl From<String> for VisualizerError {
    fn from(value: String) -> Self {
        Self::Message(value)
    }
}
