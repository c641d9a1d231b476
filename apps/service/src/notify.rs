//! Outbound alert delivery.

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use tracing::info;

/// Twilio caps message bodies at 1600 characters.
const MAX_SMS_LENGTH: usize = 1600;

/// Delivery channel for state-change alerts.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, phone: &str, message: &str) -> Result<()>;
}

/// Sends SMS alerts through the Twilio messages API.
pub struct TwilioNotifier {
    client: reqwest::Client,
    account_sid: String,
    auth_token: String,
    from_phone: String,
}

impl TwilioNotifier {
    pub fn new(account_sid: String, auth_token: String, from_phone: String) -> Result<Self> {
        Ok(Self {
            client: reqwest::Client::builder().build()?,
            account_sid,
            auth_token,
            from_phone,
        })
    }
}

#[async_trait]
impl Notifier for TwilioNotifier {
    async fn send(&self, phone: &str, message: &str) -> Result<()> {
        let message = message.trim();
        if message.is_empty() || message.len() > MAX_SMS_LENGTH {
            return Err(anyhow!(
                "alert message must be between 1 and {MAX_SMS_LENGTH} characters"
            ));
        }

        let endpoint = format!(
            "https://api.twilio.com/2010-04-01/Accounts/{}/Messages.json",
            self.account_sid
        );
        let to_phone = format!("+1{phone}");
        let response = self
            .client
            .post(&endpoint)
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .form(&[
                ("From", self.from_phone.as_str()),
                ("To", to_phone.as_str()),
                ("Body", message),
            ])
            .send()
            .await?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(anyhow!("twilio returned status {}", response.status()))
        }
    }
}

/// Fallback used when no Twilio credentials are configured: alerts land in
/// the service log instead of going out.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, phone: &str, message: &str) -> Result<()> {
        info!(%phone, "alert (delivery disabled): {message}");
        Ok(())
    }
}
