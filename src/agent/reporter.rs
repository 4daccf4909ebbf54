//! HTTP push to the hub

use std::fmt;
use std::time::Duration;

use anyhow::Context;
use reqwest::StatusCode;
use tracing::{instrument, trace};

use crate::{AGENT_TOKEN_HEADER, MetricsPayload, SUBMIT_PATH};

/// Upper bound for one push, connect included
pub const PUSH_TIMEOUT: Duration = Duration::from_secs(10);

/// A push that did not end with `201 Created`
#[derive(Debug)]
pub enum PushError {
    /// The request never got a response
    Transport(reqwest::Error),

    /// The hub answered with something other than `201 Created`
    Rejected { status: StatusCode, body: String },
}

impl fmt::Display for PushError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PushError::Transport(e) => write!(f, "failed to connect to API: {e}"),
            PushError::Rejected { status, body } => {
                write!(f, "failed to send metrics: {status} - {body}")
            }
        }
    }
}

impl std::error::Error for PushError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PushError::Transport(e) => Some(e),
            PushError::Rejected { .. } => None,
        }
    }
}

impl From<reqwest::Error> for PushError {
    fn from(err: reqwest::Error) -> Self {
        PushError::Transport(err)
    }
}

/// Sends samples to `{api_url}/api/metrics/submit`
pub struct Reporter {
    /// HTTP client (reused across pushes)
    client: reqwest::Client,
    url: String,
    token: String,
}

impl Reporter {
    pub fn new(api_url: &str, token: &str) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(PUSH_TIMEOUT)
            .build()
            .context("failed to build HTTP client")?;

        Ok(Self {
            client,
            url: format!("{}{}", api_url.trim_end_matches('/'), SUBMIT_PATH),
            token: token.to_string(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    #[instrument(skip_all)]
    pub async fn push(&self, payload: &MetricsPayload) -> Result<(), PushError> {
        trace!("pushing metrics to {}", self.url);

        let response = self
            .client
            .post(&self.url)
            .header(AGENT_TOKEN_HEADER, &self.token)
            .json(payload)
            .send()
            .await?;

        let status = response.status();
        if status != StatusCode::CREATED {
            let body = response.text().await.unwrap_or_default();
            return Err(PushError::Rejected { status, body });
        }

        Ok(())
    }
}
