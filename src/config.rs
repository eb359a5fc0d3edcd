use std::time::Duration;

use dotenv::dotenv;
use log::warn;
use teloxide::Bot;

/// Credentials for the cloud speech backend. All three pieces are required;
/// without them the bot runs on the fallback recognizer alone.
#[derive(Clone)]
pub struct CloudConfig {
    pub project_id: String,
    pub region: String,
    pub access_token: String,
}

#[derive(Clone)]
pub struct Config {
    bot: Bot,
    http_client: reqwest::Client,
    cloud: Option<CloudConfig>,
    speech_api_key: Option<String>,
    language: String,
}

impl Config {
    pub fn new() -> Self {
        dotenv().ok();

        let bot_token = std::env::var("BOT_TOKEN").expect("BOT_TOKEN expected");
        let bot = Bot::new(bot_token);

        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .expect("Failed to build HTTP client");

        let cloud = match (
            std::env::var("GCLOUD_PROJECT_ID"),
            std::env::var("GCLOUD_ACCESS_TOKEN"),
        ) {
            (Ok(project_id), Ok(access_token)) => Some(CloudConfig {
                project_id,
                region: std::env::var("GCLOUD_REGION").unwrap_or_else(|_| "global".to_string()),
                access_token,
            }),
            _ => {
                warn!("GCLOUD_PROJECT_ID or GCLOUD_ACCESS_TOKEN missing, cloud recognizer disabled");
                None
            }
        };

        let speech_api_key = std::env::var("SPEECH_API_KEY").ok();
        if speech_api_key.is_none() {
            warn!("SPEECH_API_KEY missing, fallback recognizer will report a service error");
        }

        let language = std::env::var("SPEECH_LANGUAGE").unwrap_or_else(|_| "en-US".to_string());

        Config {
            bot,
            http_client,
            cloud,
            speech_api_key,
            language,
        }
    }

    pub fn get_bot(&self) -> &Bot {
        &self.bot
    }

    pub fn get_http_client(&self) -> &reqwest::Client {
        &self.http_client
    }

    pub fn get_cloud(&self) -> Option<&CloudConfig> {
        self.cloud.as_ref()
    }

    pub fn get_speech_api_key(&self) -> Option<&str> {
        self.speech_api_key.as_deref()
    }

    pub fn get_language(&self) -> &str {
        &self.language
    }
}
