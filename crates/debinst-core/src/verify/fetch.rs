//! Transport for keyrings and signatures.

use reqwest::blocking::Client;
use thiserror::Error;
use tracing::debug;

use crate::config::NetConfig;

/// Failure to retrieve a document.
#[derive(Error, Debug)]
pub enum FetchError {
    /// The server answered with a non-2xx status.
    #[error("HTTP status {status}")]
    Status {
        /// Status code.
        status: u16,
    },

    /// Connection, timeout or TLS failure.
    #[error("transport error: {0}")]
    Transport(String),

    /// The body could not be read as text.
    #[error("unreadable response body: {0}")]
    Body(String),

    /// Client construction failed.
    #[error("HTTP client setup failed: {0}")]
    Client(String),
}

/// Retrieves small text documents by URL.
///
/// Implementations perform one attempt; callers decide about retries.
pub trait Fetch: Send + Sync {
    /// Returns the body of `url`.
    ///
    /// # Errors
    ///
    /// Returns a [`FetchError`] for transport failures and non-2xx answers.
    fn fetch(&self, url: &str) -> Result<String, FetchError>;
}

/// Blocking HTTP fetcher with connect and total timeouts.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    /// Builds the underlying client from `config`.
    ///
    /// # Errors
    ///
    /// Returns `FetchError::Client` if the TLS backend cannot be initialised.
    pub fn new(config: &NetConfig) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout)
            .user_agent(&config.user_agent)
            .build()
            .map_err(|e| FetchError::Client(e.to_string()))?;

        Ok(Self { client })
    }
}

impl Fetch for HttpFetcher {
    fn fetch(&self, url: &str) -> Result<String, FetchError> {
        debug!(url, "fetching");
        let response = self
            .client
            .get(url)
            .send()
            .map_err(|e| FetchError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
            });
        }

        response.text().map_err(|e| FetchError::Body(e.to_string()))
    }
}
