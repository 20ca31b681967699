use std::fmt;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::Value;

use crate::config::Config;
use crate::Result;

/// Result of forwarding one record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Saved,
    /// The destination answered with anything but `200 OK`.
    Rejected { status: u16, body: String },
    TransportFailed(String),
}

impl Outcome {
    pub fn is_saved(&self) -> bool {
        matches!(self, Outcome::Saved)
    }

    /// Only exactly `200` counts, a `201 Created` is still a rejection.
    pub fn from_response(status: u16, body: String) -> Self {
        if status == StatusCode::OK.as_u16() {
            Outcome::Saved
        } else {
            Outcome::Rejected { status, body }
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Saved => write!(f, "saved"),
            Outcome::Rejected { status, body } => write!(f, "rejected with {status}: {body}"),
            Outcome::TransportFailed(cause) => write!(f, "transport failed: {cause}"),
        }
    }
}

#[async_trait]
pub trait Forward: Send + Sync {
    /// POSTs `body` to `url`. Never fails, the outcome says what happened.
    async fn send(&self, url: &str, body: &Value) -> Outcome;
}

pub struct HttpForwarder {
    client: Client,
    auth_token: String,
}

impl HttpForwarder {
    pub fn new(config: &Config) -> Result<Self> {
        let client = Client::builder().timeout(config.request_timeout).build()?;
        Ok(Self {
            client,
            auth_token: config.auth_token.clone(),
        })
    }
}

#[async_trait]
impl Forward for HttpForwarder {
    async fn send(&self, url: &str, body: &Value) -> Outcome {
        let res = match self
            .client
            .post(url)
            .bearer_auth(&self.auth_token)
            .json(body)
            .send()
            .await
        {
            Ok(res) => res,
            Err(e) => return Outcome::TransportFailed(e.to_string()),
        };

        let status = res.status().as_u16();
        let body = res.text().await.unwrap_or_default();
        Outcome::from_response(status, body)
    }
}
