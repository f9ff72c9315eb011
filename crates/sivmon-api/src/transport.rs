// Shared transport configuration for building the reqwest::Client.
//
// Timeout, TLS leniency, and user agent live here so the client
// constructor and tests build identical HTTP stacks.

use std::time::Duration;

/// Transport settings for the backend HTTP client.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Hard ceiling for a single request, enforced by reqwest.
    pub timeout: Duration,
    /// Accept self-signed certificates (lab deployments).
    pub accept_invalid_certs: bool,
    pub user_agent: String,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            accept_invalid_certs: false,
            user_agent: concat!("sivmon/", env!("CARGO_PKG_VERSION")).to_owned(),
        }
    }
}

impl TransportConfig {
    /// Build a `reqwest::Client` from this config.
    pub fn build_client(&self) -> Result<reqwest::Client, crate::error::Error> {
        let mut builder = reqwest::Client::builder()
            .timeout(self.timeout)
            .user_agent(self.user_agent.as_str());

        if self.accept_invalid_certs {
            builder = builder.danger_accept_invalid_certs(true);
        }

        builder
            .build()
            .map_err(|e| crate::error::Error::Tls(format!("failed to build HTTP client: {e}")))
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}
