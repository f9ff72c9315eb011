// SIV backend HTTP client
//
// Wraps `reqwest::Client` with base-URL joining, bearer-token injection
// from the session context, and status-code classification. Endpoint
// groups (cameras, incidents, users) live in sibling modules as inherent
// methods so this file stays focused on transport mechanics.

use std::time::Duration;

use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, trace, warn};
use url::Url;

use crate::error::Error;
use crate::session::SessionContext;
use crate::transport::TransportConfig;

/// Where the backend mounts its routers.
pub const DEFAULT_API_PREFIX: &str = "/api";

/// HTTP client for the SIV backend.
///
/// Cheap to clone: the underlying `reqwest::Client` and the session are
/// both reference-counted.
#[derive(Debug, Clone)]
pub struct SivClient {
    http: reqwest::Client,
    base_url: Url,
    /// Mount point of every endpoint below the base URL.
    api_prefix: String,
    session: SessionContext,
    timeout: Duration,
}

impl SivClient {
    /// Create a client from a `TransportConfig`.
    pub fn new(
        base_url: Url,
        session: SessionContext,
        transport: &TransportConfig,
    ) -> Result<Self, Error> {
        let http = transport.build_client()?;
        let mut client = Self::with_client(http, base_url, session);
        client.timeout = transport.timeout;
        Ok(client)
    }

    /// Create a client around a pre-built `reqwest::Client`.
    pub fn with_client(http: reqwest::Client, base_url: Url, session: SessionContext) -> Self {
        Self {
            http,
            base_url,
            api_prefix: DEFAULT_API_PREFIX.to_owned(),
            session,
            timeout: TransportConfig::default().timeout,
        }
    }

    /// Mount every endpoint under `prefix` instead of `/api`. An empty
    /// prefix puts them directly below the base URL.
    pub fn with_api_prefix(mut self, prefix: &str) -> Self {
        let trimmed = prefix.trim().trim_matches('/');
        self.api_prefix = if trimmed.is_empty() {
            String::new()
        } else {
            format!("/{trimmed}")
        };
        self
    }

    pub fn api_prefix(&self) -> &str {
        &self.api_prefix
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn session(&self) -> &SessionContext {
        &self.session
    }

    // ── URL builder ──────────────────────────────────────────────────

    /// `{base}{api_prefix}{path}`, keeping any path the base URL carries.
    pub(crate) fn url(&self, path: &str) -> Result<Url, Error> {
        let base = self.base_url.as_str().trim_end_matches('/');
        Ok(Url::parse(&format!("{base}{}{path}", self.api_prefix))?)
    }

    // ── Request helpers ──────────────────────────────────────────────

    /// GET and decode a JSON body.
    pub(crate) async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, Error> {
        let url = self.url(path)?;
        debug!("GET {url}");
        let resp = self.dispatch(self.http.get(url)).await?;
        decode(resp).await
    }

    /// Send a JSON body with `method` and decode the JSON response.
    pub(crate) async fn send_json<B, T>(
        &self,
        method: Method,
        path: &str,
        body: &B,
    ) -> Result<T, Error>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let url = self.url(path)?;
        debug!("{method} {url}");
        let resp = self
            .dispatch(self.http.request(method, url).json(body))
            .await?;
        decode(resp).await
    }

    /// POST without a body; the response body is ignored.
    pub(crate) async fn post_empty(&self, path: &str) -> Result<(), Error> {
        let url = self.url(path)?;
        debug!("POST {url}");
        self.dispatch(self.http.post(url)).await?;
        Ok(())
    }

    /// Attach the bearer token, send, and classify the status code.
    ///
    /// 401/403 invalidate the session. Nothing is sent once the session
    /// is gone.
    async fn dispatch(&self, builder: RequestBuilder) -> Result<Response, Error> {
        let Some(bearer) = self.session.bearer() else {
            return Err(Error::SessionInvalidated);
        };

        let resp = builder
            .header(reqwest::header::AUTHORIZATION, bearer)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    Error::Timeout {
                        timeout_ms: u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX),
                    }
                } else {
                    Error::Transport(e)
                }
            })?;

        let status = resp.status();
        trace!(%status, url = %resp.url(), "response");

        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            warn!(%status, url = %resp.url(), "backend rejected credentials");
            self.session
                .invalidate(format!("backend answered HTTP {}", status.as_u16()));
            return Err(Error::Unauthorized {
                status: status.as_u16(),
            });
        }

        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::Http {
                status: status.as_u16(),
                message: detail_message(&body),
            });
        }

        Ok(resp)
    }
}

/// Decode a JSON body, keeping the raw text on failure.
async fn decode<T: DeserializeOwned>(resp: Response) -> Result<T, Error> {
    let body = resp.text().await.map_err(Error::Transport)?;
    serde_json::from_str(&body).map_err(|e| Error::Deserialization {
        message: e.to_string(),
        body,
    })
}

/// FastAPI reports errors as `{"detail": "..."}`; fall back to the raw body.
fn detail_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| match v.get("detail") {
            Some(serde_json::Value::String(s)) => Some(s.clone()),
            Some(other) => Some(other.to_string()),
            None => None,
        })
        .unwrap_or_else(|| body.to_owned())
}

#[cfg(test)]
mod tests {
    use super::detail_message;

    #[test]
    fn detail_message_prefers_fastapi_detail() {
        assert_eq!(
            detail_message(r#"{"detail":"Incidente no encontrado"}"#),
            "Incidente no encontrado"
        );
        assert_eq!(detail_message("plain failure"), "plain failure");
    }
}
