//! Postmark template API client.
//!
//! Sends `POST {api_url}/email/withTemplate` authenticated with the
//! `X-Postmark-Server-Token` header.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{MailDelivery, TemplateKind};
use crate::error::MailError;

/// Postmark HTTP client.
#[derive(Clone)]
pub struct PostmarkMailer {
    client: reqwest::Client,
    api_url: String,
    api_token: String,
    from: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct TemplatedEmail<'a> {
    from: &'a str,
    to: &'a str,
    template_alias: &'a str,
    template_model: &'a Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct PostmarkError {
    #[serde(default)]
    error_code: i64,
    #[serde(default)]
    message: String,
}

impl PostmarkMailer {
    /// Creates a client for the given API base URL and server token.
    ///
    /// # Errors
    ///
    /// Returns [`MailError::Transport`] if the HTTP client cannot be built.
    pub fn new(
        api_url: impl Into<String>,
        api_token: impl Into<String>,
        from: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, MailError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| MailError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            api_url: api_url.into().trim_end_matches('/').to_string(),
            api_token: api_token.into(),
            from: from.into(),
        })
    }
}

impl fmt::Debug for PostmarkMailer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PostmarkMailer")
            .field("api_url", &self.api_url)
            .field("from", &self.from)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl MailDelivery for PostmarkMailer {
    async fn send(
        &self,
        template: TemplateKind,
        recipient: &str,
        model: &Value,
    ) -> Result<(), MailError> {
        let body = TemplatedEmail {
            from: &self.from,
            to: recipient,
            template_alias: template.alias(),
            template_model: model,
        };

        let response = self
            .client
            .post(format!("{}/email/withTemplate", self.api_url))
            .header("Accept", "application/json")
            .header("X-Postmark-Server-Token", &self.api_token)
            .json(&body)
            .send()
            .await
            .map_err(|e| MailError::Transport(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let message = match response.json::<PostmarkError>().await {
            Ok(err) => format!("{} (code {})", err.message, err.error_code),
            Err(e) => e.to_string(),
        };
        Err(MailError::Rejected {
            status: status.as_u16(),
            message,
        })
    }
}
