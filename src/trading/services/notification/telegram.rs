use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use tracing::{error, info};

use super::Notifier;
use crate::app_config::env::env_required;
use crate::error::{EngineError, EngineResult};

/// Telegram Bot 通知服务
pub struct TelegramNotifier {
    client: Client,
    api_url: String,
    bot_token: String,
    chat_id: String,
}

#[derive(Serialize)]
struct SendMessageRequest<'a> {
    chat_id: &'a str,
    text: &'a str,
}

impl TelegramNotifier {
    pub fn new(bot_token: String, chat_id: String) -> Self {
        Self {
            client: Client::new(),
            api_url: "https://api.telegram.org".to_string(),
            bot_token,
            chat_id,
        }
    }

    /// 从环境变量创建通知器
    /// 需要设置: TELEGRAM_BOT_TOKEN, TELEGRAM_CHAT_ID
    pub fn from_env() -> EngineResult<Self> {
        Ok(Self::new(
            env_required("TELEGRAM_BOT_TOKEN")?,
            env_required("TELEGRAM_CHAT_ID")?,
        ))
    }

    /// 发送纯文本消息
    pub async fn send_message(&self, text: &str) -> EngineResult<()> {
        let url = format!("{}/bot{}/sendMessage", self.api_url, self.bot_token);
        let request = SendMessageRequest {
            chat_id: &self.chat_id,
            text,
        };

        let response = self.client.post(&url).json(&request).send().await?;
        if response.status().is_success() {
            info!("📨 Telegram message sent");
            Ok(())
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(EngineError::Notification(format!("telegram {}: {}", status, body)))
        }
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn notify(&self, message: &str) {
        if let Err(e) = self.send_message(message).await {
            error!("Failed to send Telegram message: {}", e);
        }
    }
}
