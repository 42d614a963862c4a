/// Result alias that carries the custom [`PlayerError`] type.
pub type Result<T> = std::result::Result<T, PlayerError>;

/// Common error type for the player core.
#[derive(Debug, thiserror::Error)]
pub enum PlayerError {
    /// Free-form error raised by callbacks and the command line front end.
    #[error("{0}")]
    Message(String),
    /// Wrapper around standard IO errors.
    #[error("{0}")]
    Io(#[from] std::io::Error),
    /// Scene descriptions, decks and configs are JSON documents.
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
    /// The scene description parsed but describes an invalid tree.
    #[error("invalid scene description: {0}")]
    InvalidScene(String),
    /// An operation needs a loaded scene.
    #[error("no scene is loaded")]
    NoScene,
    #[error("no node with id `{0}`")]
    NodeNotFound(String),
    /// The handle belongs to a scene that has since been replaced.
    #[error("node handle refers to a scene that is no longer loaded")]
    StaleNode,
    #[error("child index {index} out of range for `{parent}` with {len} children")]
    ChildIndexOutOfRange {
        parent: String,
        index: usize,
        len: usize,
    },
    #[error("active child {index} out of range for `{node}` with {len} children")]
    ActiveChildOutOfRange {
        node: String,
        index: i64,
        len: usize,
    },
    #[error("unknown attribute `{0}`")]
    UnknownAttribute(String),
    #[error("{kind} nodes have no `{attr}` attribute")]
    UnsupportedAttribute { kind: &'static str, attr: &'static str },
    #[error("attribute `{0}` is read-only")]
    ReadOnlyAttribute(&'static str),
    #[error("attribute `{attr}` expects a {expected} value")]
    AttributeType {
        attr: &'static str,
        expected: &'static str,
    },
    #[error("invalid value for `{attr}`: {reason}")]
    InvalidValue { attr: &'static str, reason: String },
    #[error("node `{id}` is not a {expected} node")]
    WrongNodeType { id: String, expected: &'static str },
}

impl PlayerError {
    /// Creates a new error that simply wraps the provided message.
    pub fn msg<T: Into<String>>(msg: T) -> Self {
        Self::Message(msg.into())
    }

    /// Returns true for lookup failures (unknown id or stale handle).
    pub fn is_lookup(&self) -> bool {
        matches!(self, Self::NodeNotFound(_) | Self::StaleNode)
    }

    /// Returns true for out-of-bounds child or active-child indices.
    pub fn is_range(&self) -> bool {
        matches!(
            self,
            Self::ChildIndexOutOfRange { .. } | Self::ActiveChildOutOfRange { .. }
        )
    }
}

impl From<&str> for PlayerError {
    fn from(value: &str) -> Self {
        Self::msg(value)
    }
}

impl From<String> for PlayerError {
    fn from(value: String) -> Self {
        Self::Message(value)
    }
}
