pub type DrapeResult<T> = Result<T, DrapeError>;

#[derive(thiserror::Error, Debug)]
pub enum DrapeError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("depth provider error: {0}")]
    Provider(String),

    #[error("renderer init error: {0}")]
    RendererInit(String),

    #[error("decode error: {0}")]
    Decode(String),

    #[error("texture timeout: {0}")]
    TextureTimeout(String),

    #[error("evaluation error: {0}")]
    Evaluation(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl DrapeError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn provider(msg: impl Into<String>) -> Self {
        Self::Provider(msg.into())
    }

    pub fn renderer_init(msg: impl Into<String>) -> Self {
        Self::RendererInit(msg.into())
    }

    pub fn decode(msg: impl Into<String>) -> Self {
        Self::Decode(msg.into())
    }

    pub fn texture_timeout(msg: impl Into<String>) -> Self {
        Self::TextureTimeout(msg.into())
    }

    pub fn evaluation(msg: impl Into<String>) -> Self {
        Self::Evaluation(msg.into())
    }

    /// Whether the GPU path could not be brought up at all.
    pub fn is_renderer_init(&self) -> bool {
        matches!(self, Self::RendererInit(_))
    }
}
