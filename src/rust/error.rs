/// Represents the different types of errors that can occur while building or
/// running a classification.
#[derive(Debug, thiserror::Error)]
pub enum ClassificationError {
    /// The recipe, classifier configuration or band request is invalid.
    /// Raised while the expression graph is built, before any remote work.
    #[error("Configuration error: {0}")]
    Configuration(String),
    /// A collaborator failed: recipe lookup, image source or engine round trip
    #[error("Failed to resolve {what}: {source}")]
    UpstreamResolution {
        what: String,
        #[source]
        source: anyhow::Error,
    },
    /// The recipe document could not be parsed
    #[error("Invalid recipe: {0}")]
    InvalidRecipe(#[from] serde_json::Error),
    /// The engine answered with a value of unexpected shape
    #[error("Engine error: {0}")]
    Engine(String),
}

impl ClassificationError {
    pub(crate) fn config(msg: impl Into<String>) -> Self {
        ClassificationError::Configuration(msg.into())
    }

    pub(crate) fn upstream(what: impl Into<String>, source: impl Into<anyhow::Error>) -> Self {
        ClassificationError::UpstreamResolution {
            what: what.into(),
            source: source.into(),
        }
    }

    /// True for errors raised at graph-construction time
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration(_) | Self::InvalidRecipe(_))
    }
}

pub type Result<T, E = ClassificationError> = std::result::Result<T, E>;
