//! Outbound SMS relay through the Twilio Messages REST API.

use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

/// Twilio account settings. All three credentials are required to send.
#[derive(Clone, Default)]
pub struct SmsConfig {
    pub account_sid: Option<String>,
    pub auth_token: Option<String>,
    /// Sender number in E.164 form.
    pub from_number: Option<String>,
    pub api_base: String,
    pub timeout_secs: u64,
}

impl std::fmt::Debug for SmsConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmsConfig")
            .field("account_sid", &self.account_sid)
            .field("auth_token", &self.auth_token.as_ref().map(|_| "<redacted>"))
            .field("from_number", &self.from_number)
            .field("api_base", &self.api_base)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

#[derive(Error, Debug)]
pub enum SmsError {
    #[error("SMS provider not configured: missing {0}")]
    NotConfigured(&'static str),
    #[error("invalid message: {0}")]
    InvalidMessage(&'static str),
    #[error("provider request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("provider rejected message ({status}): {message}")]
    Rejected { status: u16, message: String },
}

#[derive(Debug, Deserialize)]
struct MessageResource {
    sid: String,
}

#[derive(Debug, Deserialize)]
struct ProviderError {
    #[serde(default)]
    code: Option<u32>,
    #[serde(default)]
    message: String,
}

/// Async Twilio client.
pub struct SmsClient {
    client: Client,
    config: SmsConfig,
}

impl SmsClient {
    pub fn new(config: SmsConfig) -> Result<Self, SmsError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .build()?;
        Ok(Self { client, config })
    }

    pub fn is_configured(&self) -> bool {
        self.config.account_sid.is_some()
            && self.config.auth_token.is_some()
            && self.config.from_number.is_some()
    }

    /// Send `body` to `to`. Returns the provider's message SID.
    pub async fn send(&self, to: &str, body: &str) -> Result<String, SmsError> {
        let sid = self
            .config
            .account_sid
            .as_deref()
            .ok_or(SmsError::NotConfigured("TWILIO_ACCOUNT_SID"))?;
        let token = self
            .config
            .auth_token
            .as_deref()
            .ok_or(SmsError::NotConfigured("TWILIO_AUTH_TOKEN"))?;
        let from = self
            .config
            .from_number
            .as_deref()
            .ok_or(SmsError::NotConfigured("TWILIO_PHONE_NUMBER"))?;

        if to.trim().is_empty() {
            return Err(SmsError::InvalidMessage("recipient is empty"));
        }

        let url = format!(
            "{}/2010-04-01/Accounts/{sid}/Messages.json",
            self.config.api_base.trim_end_matches('/')
        );

        let response = self
            .client
            .post(&url)
            .basic_auth(sid, Some(token))
            .form(&[("To", to), ("From", from), ("Body", body)])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let message = match serde_json::from_str::<ProviderError>(&text) {
                Ok(err) => match err.code {
                    Some(code) => format!("{} (code {code})", err.message),
                    None => err.message,
                },
                Err(_) => text,
            };
            return Err(SmsError::Rejected {
                status: status.as_u16(),
                message,
            });
        }

        let resource: MessageResource = response.json().await?;
        tracing::info!(sid = %resource.sid, "SMS sent");
        Ok(resource.sid)
    }
}
