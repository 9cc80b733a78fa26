use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, Url};
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::Config;
use crate::mailer::model::{OutgoingEmail, SendEmailResponse};

pub mod model;

const RESEND_API_BASE: &str = "https://api.resend.com/";

/// Failure to hand one email to the provider. Always contained per target.
#[derive(Debug, Error)]
pub enum SendError {
    #[error("request to email provider failed: {0}")]
    Transport(String),
    #[error("email provider returned {status}: {body}")]
    Rejected { status: u16, body: String },
    #[error("invalid email request: {0}")]
    Invalid(String),
}

#[async_trait]
pub trait EmailSender: Send + Sync {
    /// Returns the provider's message id.
    async fn send(&self, email: &OutgoingEmail) -> Result<String, SendError>;
}

#[derive(Clone)]
pub struct ResendClient {
    http: Client,
    base_url: Url,
    api_key: String,
}

impl fmt::Debug for ResendClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResendClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl ResendClient {
    pub fn new(api_key: String, timeout: Duration) -> Result<Self> {
        let base_url = Url::parse(RESEND_API_BASE).context("invalid default Resend URL")?;
        Self::with_base_url(api_key, base_url, timeout)
    }

    pub fn with_base_url(api_key: String, base_url: Url, timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .user_agent(concat!("outreach-dispatch/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            http,
            base_url,
            api_key,
        })
    }

    pub fn from_config(cfg: &Config) -> Result<Self> {
        let base_url = Url::parse(&cfg.email.base_url).context("invalid email.base_url")?;
        Self::with_base_url(
            cfg.email.api_key.clone(),
            base_url,
            Duration::from_secs(cfg.email.timeout_secs),
        )
    }

    pub fn build_request(&self, email: &OutgoingEmail) -> Result<reqwest::Request> {
        let endpoint = self
            .base_url
            .join("emails")
            .context("invalid email provider base URL")?;
        self.http
            .post(endpoint)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(email)
            .build()
            .context("failed to build email request")
    }
}

#[async_trait]
impl EmailSender for ResendClient {
    async fn send(&self, email: &OutgoingEmail) -> Result<String, SendError> {
        let request = self
            .build_request(email)
            .map_err(|e| SendError::Invalid(format!("{e:#}")))?;
        debug!(url = %request.url(), to = ?email.to, "sending email");

        let res = self
            .http
            .execute(request)
            .await
            .map_err(|e| SendError::Transport(e.to_string()))?;

        let status = res.status();
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            warn!(%status, body = %body, "email provider rejected message");
            return Err(SendError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        let payload: SendEmailResponse = res
            .json()
            .await
            .map_err(|e| SendError::Transport(format!("invalid provider response: {e}")))?;
        Ok(payload.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_email() -> OutgoingEmail {
        OutgoingEmail {
            from: "Exit School <outreach@example.com>".into(),
            to: vec!["ann@acme.test".into()],
            subject: "Hello".into(),
            html: "<p>Hi</p>".into(),
            reply_to: "team@example.com".into(),
        }
    }

    #[test]
    fn build_request_sets_headers_and_body() {
        let client = ResendClient::new("re_test".into(), Duration::from_secs(5)).unwrap();
        let request = client.build_request(&sample_email()).unwrap();
        assert_eq!(request.method(), reqwest::Method::POST);
        assert_eq!(request.url().as_str(), "https://api.resend.com/emails");
        let headers = request.headers();
        assert_eq!(
            headers
                .get("Authorization")
                .and_then(|h| h.to_str().ok())
                .unwrap(),
            "Bearer re_test"
        );

        let body = request.body().and_then(|b| b.as_bytes()).unwrap();
        let json: serde_json::Value = serde_json::from_slice(body).unwrap();
        assert_eq!(json["to"][0], "ann@acme.test");
        assert_eq!(json["reply_to"], "team@example.com");
        assert_eq!(json["html"], "<p>Hi</p>");
    }

    #[test]
    fn base_url_path_is_kept() {
        let base = Url::parse("http://127.0.0.1:9/mock/").unwrap();
        let client =
            ResendClient::with_base_url("k".into(), base, Duration::from_secs(1)).unwrap();
        let request = client.build_request(&sample_email()).unwrap();
        assert_eq!(request.url().path(), "/mock/emails");
    }

    #[tokio::test]
    async fn unreachable_provider_is_a_transport_error() {
        let base = Url::parse("http://127.0.0.1:9/").unwrap();
        let client =
            ResendClient::with_base_url("k".into(), base, Duration::from_secs(2)).unwrap();
        let err = client.send(&sample_email()).await.unwrap_err();
        assert!(matches!(err, SendError::Transport(_)));
    }
}
