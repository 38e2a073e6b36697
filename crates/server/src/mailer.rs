//! Verification emails delivered through an HTTP mail relay.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use rostergate_core::config::MailConfig;
use rostergate_core::verification::ports::{NotificationError, NotificationSink};
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use tracing::{info, warn};

#[derive(Debug, PartialEq, Eq, Serialize)]
pub struct RelayMessage<'a> {
    pub from: &'a str,
    pub to: &'a str,
    pub subject: &'a str,
    pub text: &'a str,
}

pub struct HttpMailSink {
    client: Client,
    endpoint: String,
    api_key: Option<SecretString>,
    from_address: String,
}

impl HttpMailSink {
    pub fn from_config(config: &MailConfig) -> Result<Self, NotificationError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|error| NotificationError::Transport(format!("http client setup: {error}")))?;

        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            api_key: config.api_key.clone(),
            from_address: config.from_address.clone(),
        })
    }
}

#[async_trait]
impl NotificationSink for HttpMailSink {
    async fn send(
        &self,
        address: &str,
        subject: &str,
        body: &str,
    ) -> Result<(), NotificationError> {
        let message =
            RelayMessage { from: &self.from_address, to: address, subject, text: body };
        let mut request = self.client.post(&self.endpoint).json(&message);
        if let Some(api_key) = &self.api_key {
            request = request.bearer_auth(api_key.expose_secret());
        }

        let response = request
            .send()
            .await
            .map_err(|error| NotificationError::Transport(error.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            warn!(
                event_name = "notification.mail.rejected",
                status = %status,
                detail = %detail,
                "mail relay rejected verification email"
            );
            return Err(NotificationError::Rejected(format!("relay returned {status}")));
        }

        info!(event_name = "notification.mail.sent", "verification email handed to relay");
        Ok(())
    }
}
