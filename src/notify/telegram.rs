use async_trait::async_trait;
use std::time::Duration;
use tracing::{error, info};

use super::{Notifier, SendError};
use crate::store::{keys, SettingsStore};

pub const DEFAULT_TELEGRAM_URL: &str = "https://api.telegram.org";

/// Sends alerts through the Telegram bot API.
///
/// Bot token and chat id are read from the store on every send so that a
/// credentials command takes effect without a restart.
pub struct TelegramNotifier {
    client: reqwest::Client,
    base_url: String,
    settings: SettingsStore,
}

impl TelegramNotifier {
    pub fn new(
        base_url: impl Into<String>,
        timeout: Duration,
        settings: SettingsStore,
    ) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            settings,
        })
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn send(&self, text: &str) -> Result<(), SendError> {
        let bot_token = self.settings.text(keys::BOT_TOKEN).await?;
        let recipient_id = self.settings.text(keys::RECIPIENT_ID).await?;
        if bot_token.is_empty() || recipient_id.is_empty() {
            return Err(SendError::NotConfigured);
        }

        let url = format!("{}/bot{}/sendMessage", self.base_url, bot_token);
        let response = self
            .client
            .post(&url)
            .form(&[("chat_id", recipient_id.as_str()), ("text", text)])
            .send()
            .await
            .map_err(|e| {
                error!(error = %e, "Telegram send failed");
                SendError::Transport(e.without_url().to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            error!(status = status.as_u16(), "Telegram rejected message");
            return Err(SendError::Rejected(status.as_u16()));
        }
        info!(status = status.as_u16(), "Telegram sent");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::settings::SettingsDefaults;
    use crate::store::MemoryStore;
    use std::sync::Arc;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn settings_with_credentials() -> SettingsStore {
        let store = MemoryStore::with_values([
            (keys::BOT_TOKEN, "123:abc"),
            (keys::RECIPIENT_ID, "8097"),
        ]);
        SettingsStore::new(Arc::new(store), SettingsDefaults::default())
    }

    #[tokio::test]
    async fn posts_form_to_bot_endpoint() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/bot123:abc/sendMessage"))
            .and(body_string_contains("chat_id=8097"))
            .and(body_string_contains("text=Credit+exhausted"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let notifier =
            TelegramNotifier::new(server.uri(), Duration::from_secs(5), settings_with_credentials())
                .unwrap();
        notifier.send("Credit exhausted").await.unwrap();
    }

    #[tokio::test]
    async fn rejected_status_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let notifier =
            TelegramNotifier::new(server.uri(), Duration::from_secs(5), settings_with_credentials())
                .unwrap();
        assert!(matches!(
            notifier.send("hello").await,
            Err(SendError::Rejected(401))
        ));
    }

    #[tokio::test]
    async fn missing_credentials_are_reported() {
        let settings = SettingsStore::new(Arc::new(MemoryStore::new()), SettingsDefaults::default());
        let notifier =
            TelegramNotifier::new("http://127.0.0.1:9", Duration::from_secs(1), settings).unwrap();
        assert!(matches!(
            notifier.send("hello").await,
            Err(SendError::NotConfigured)
        ));
    }
}
