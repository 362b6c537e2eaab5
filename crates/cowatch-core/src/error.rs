//! Unified error type for the cowatch sync engine.
//!
//! Every failure surfaced by the engine adapter, the source loader, or the
//! session link funnels into [`Error`]. None of them is fatal: callers decide
//! whether to log and carry on via [`Error::is_transient`].

/// Unified error type covering all failure modes in cowatch.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The playback engine rejected a command or reported a media error.
    #[error("Engine error: {0}")]
    Engine(String),

    /// A media source could not be resolved or fetched.
    #[error("Source error [{url}]: {message}")]
    Source {
        /// The URL that was being resolved.
        url: String,
        /// Human-readable error description.
        message: String,
    },

    /// The session link could not deliver a message.
    #[error("Transport error: {0}")]
    Transport(String),

    /// Input data (config, message, script) failed validation.
    #[error("Validation error: {0}")]
    Validation(String),

    /// An I/O operation failed.
    #[error("IO error: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Catch-all for unexpected internal errors.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Whether the next periodic snapshot is expected to heal this failure.
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::Transport(_) | Error::Source { .. } | Error::Io { .. })
    }

    /// Convenience constructor for [`Error::Engine`].
    pub fn engine(message: impl Into<String>) -> Self {
        Error::Engine(message.into())
    }

    /// Convenience constructor for [`Error::Source`].
    pub fn source(url: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Source {
            url: url.into(),
            message: message.into(),
        }
    }

    /// Convenience constructor for [`Error::Transport`].
    pub fn transport(message: impl Into<String>) -> Self {
        Error::Transport(message.into())
    }
}

/// Result alias using the crate-level [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engine_display() {
        let err = Error::engine("unsupported codec");
        assert_eq!(err.to_string(), "Engine error: unsupported codec");
        assert!(!err.is_transient());
    }

    #[test]
    fn source_display() {
        let err = Error::source("https://cdn.example/a.mp4", "404");
        assert_eq!(
            err.to_string(),
            "Source error [https://cdn.example/a.mp4]: 404"
        );
        assert!(err.is_transient());
    }

    #[test]
    fn transport_is_transient() {
        let err = Error::transport("socket closed");
        assert_eq!(err.to_string(), "Transport error: socket closed");
        assert!(err.is_transient());
    }

    #[test]
    fn io_from_std() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "script missing");
        let err = Error::from(io_err);
        assert!(matches!(err, Error::Io { .. }));
    }

    #[test]
    fn validation_display() {
        let err = Error::Validation("time must be finite".into());
        assert_eq!(err.to_string(), "Validation error: time must be finite");
        assert!(!err.is_transient());
    }
}
