//! Error types for property access, path resolution and bindings.

/// Errors surfaced by the property runtime.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A non-terminal path segment did not resolve to an object.
    #[error("cannot resolve `{path}`: segment `{segment}` is not an object")]
    PathResolution { path: String, segment: String },

    /// The path string does not follow the path grammar.
    #[error("invalid path `{path}`: {reason}")]
    InvalidPath { path: String, reason: &'static str },

    /// An absolute path names a root that is not registered.
    #[error("unknown root `{0}`")]
    UnknownRoot(String),

    /// A computed property depends on itself, directly or through paths.
    #[error("dependency cycle through `{key}`")]
    DependencyCycle { key: String },

    /// The binding was disconnected.
    #[error("binding is disconnected")]
    Disconnected,

    /// The run loop kept producing work after the configured number of passes.
    #[error("run loop did not settle after {passes} passes")]
    SettleLimit { passes: usize },

    /// Configuration could not be parsed.
    #[error("invalid configuration: {0}")]
    Config(#[from] serde_json::Error),
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;
