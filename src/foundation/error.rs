/// Convenience result type used across the renderer.
pub type VnmarkResult<T> = Result<T, VnmarkError>;

/// Top-level error taxonomy used by driver and media APIs.
#[derive(thiserror::Error, Debug)]
pub enum VnmarkError {
    /// Caller precondition violated (reload, seeking backwards, invalid props).
    #[error("validation error: {0}")]
    Validation(String),

    /// Unknown element property or a value of the wrong type.
    #[error("property error: {0}")]
    Property(String),

    /// Engine or view reported a state the driver cannot continue from.
    #[error("contract violation: {0}")]
    Contract(String),

    /// Probing, decoding or fetching a media resource failed.
    #[error("media error: {0}")]
    Media(String),

    /// Errors when serializing or deserializing data structures.
    #[error("serialization error: {0}")]
    Serde(String),

    /// Wrapped lower-level error from dependencies or IO.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl VnmarkError {
    /// Build a [`VnmarkError::Validation`] value.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Build a [`VnmarkError::Property`] value.
    pub fn property(msg: impl Into<String>) -> Self {
        Self::Property(msg.into())
    }

    /// Build a [`VnmarkError::Contract`] value.
    pub fn contract(msg: impl Into<String>) -> Self {
        Self::Contract(msg.into())
    }

    /// Build a [`VnmarkError::Media`] value.
    pub fn media(msg: impl Into<String>) -> Self {
        Self::Media(msg.into())
    }

    /// Build a [`VnmarkError::Serde`] value.
    pub fn serde(msg: impl Into<String>) -> Self {
        Self::Serde(msg.into())
    }
}

impl From<serde_json::Error> for VnmarkError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serde(e.to_string())
    }
}
