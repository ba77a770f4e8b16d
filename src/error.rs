//! Error types for the glimpse-sw library.

use thiserror::Error;

use crate::worker::WorkerState;

/// Errors that can occur while intercepting requests or managing caches.
#[derive(Error, Debug)]
pub enum Error {
    /// The network layer could not produce a response.
    #[error("Network request failed: {0}")]
    Network(String),

    /// HTTP transport error from the reqwest client.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// No cached response exists for the given key.
    #[error("No cached response for {0}")]
    CacheMiss(String),

    /// A manifest asset could not be precached during install.
    #[error("Precache failed for {url}: status {status}")]
    Precache {
        /// URL of the asset that failed.
        url: String,
        /// HTTP status returned by the network.
        status: u16,
    },

    /// A URL could not be parsed or resolved.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// A lifecycle hook was invoked in the wrong worker state.
    #[error("Cannot {action} while worker is {state}")]
    InvalidState {
        /// Current worker state.
        state: WorkerState,
        /// The hook that was rejected.
        action: &'static str,
    },

    /// A control message or stored entry could not be (de)serialized.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The configuration file could not be parsed.
    #[error("Config error: {0}")]
    Config(#[from] toml::de::Error),

    /// I/O error from the disk cache backend.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Returns true if this error means the network layer failed, as opposed
    /// to storage or protocol errors.
    #[must_use]
    pub const fn is_network_failure(&self) -> bool {
        matches!(self, Self::Network(_) | Self::Http(_))
    }
}

/// A specialized `Result` type for glimpse-sw operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn network_errors_are_classified() {
        assert!(Error::Network("offline".to_string()).is_network_failure());
        assert!(!Error::CacheMiss("GET /".to_string()).is_network_failure());
        assert!(!Error::Io(std::io::Error::other("disk")).is_network_failure());
    }

    #[test]
    fn invalid_state_message_names_the_hook() {
        let err = Error::InvalidState {
            state: WorkerState::Activated,
            action: "install",
        };
        assert_eq!(err.to_string(), "Cannot install while worker is activated");
    }
}
