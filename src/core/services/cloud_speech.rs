//! Cloud Speech v2 REST client: recognizer lookup/creation backend and the
//! primary transcription path.

use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use log::{debug, error, info, warn};
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;

use crate::config::CloudConfig;
use crate::core::services::pipeline::PrimaryTranscriber;
use crate::core::services::recognizer::{
    RecognizerBackend, RecognizerConfig, RecognizerRegistry, RegistryError, CREATE_WAIT,
};

#[derive(Debug, Error)]
pub enum CloudSpeechError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("service returned HTTP {status}: {body}")]
    Service { status: StatusCode, body: String },
}

/// Thin REST wrapper over the v2 surface. Cheap to clone; the inner reqwest
/// client is shared.
#[derive(Clone)]
pub struct SpeechV2Api {
    http: reqwest::Client,
    project: String,
    region: String,
    access_token: String,
}

impl SpeechV2Api {
    pub fn new(http: reqwest::Client, cloud: &CloudConfig) -> Self {
        SpeechV2Api {
            http,
            project: cloud.project_id.clone(),
            region: cloud.region.clone(),
            access_token: cloud.access_token.clone(),
        }
    }

    fn endpoint(&self) -> String {
        if self.region == "global" {
            "https://speech.googleapis.com/v2".to_owned()
        } else {
            format!("https://{}-speech.googleapis.com/v2", self.region)
        }
    }

    /// Synchronous recognition against a resolved recognizer, inline audio.
    pub async fn recognize(
        &self,
        recognizer: &str,
        audio: &[u8],
    ) -> Result<Option<String>, CloudSpeechError> {
        let url = format!("{}/{}:recognize", self.endpoint(), recognizer);
        let body = json!({ "content": BASE64.encode(audio) });

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.access_token)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CloudSpeechError::Service { status, body });
        }

        let parsed: RecognizeResponse = response.json().await?;
        Ok(join_results(&parsed))
    }
}

#[async_trait]
impl RecognizerBackend for SpeechV2Api {
    async fn fetch(&self, name: &str) -> Result<Option<String>, RegistryError> {
        let url = format!("{}/{}", self.endpoint(), name);
        let response = self
            .http
            .get(&url)
            .bearer_auth(&self.access_token)
            .send()
            .await
            .map_err(|e| RegistryError::Lookup(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            let resource: RecognizerResource = response
                .json()
                .await
                .map_err(|e| RegistryError::Lookup(e.to_string()))?;
            return Ok(Some(resource.name));
        }

        let body = response.text().await.unwrap_or_default();
        if is_not_found(status, &body) {
            return Ok(None);
        }
        Err(RegistryError::Lookup(format!("HTTP {status}: {body}")))
    }

    async fn create(
        &self,
        parent: &str,
        recognizer_id: &str,
        config: &RecognizerConfig,
    ) -> Result<String, RegistryError> {
        let url = format!(
            "{}/{}/recognizers?recognizerId={}",
            self.endpoint(),
            parent,
            recognizer_id
        );
        let body = json!({
            "languageCodes": config.language_codes,
            "model": config.model,
            "defaultRecognitionConfig": {
                "autoDecodingConfig": {},
                "features": { "enableAutomaticPunctuation": config.auto_punctuation }
            }
        });

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.access_token)
            .json(&body)
            .send()
            .await
            .map_err(|e| RegistryError::Create(e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| RegistryError::Create(e.to_string()))?;

        // Another process may have created it between our lookup and now.
        if status == StatusCode::CONFLICT {
            info!("Recognizer {} already exists, reusing", recognizer_id);
            return Ok(format!("{parent}/recognizers/{recognizer_id}"));
        }
        if !status.is_success() {
            return Err(RegistryError::Create(format!("HTTP {status}: {text}")));
        }

        let operation: Operation =
            serde_json::from_str(&text).map_err(|e| RegistryError::Create(e.to_string()))?;
        let name = self.wait_operation(operation).await?;
        Ok(name.unwrap_or_else(|| format!("{parent}/recognizers/{recognizer_id}")))
    }
}

impl SpeechV2Api {
    async fn wait_operation(
        &self,
        mut operation: Operation,
    ) -> Result<Option<String>, RegistryError> {
        tokio::time::timeout(CREATE_WAIT, async {
            loop {
                if operation.done {
                    if let Some(status) = operation.error {
                        return Err(RegistryError::Create(
                            status
                                .message
                                .unwrap_or_else(|| "operation failed".to_owned()),
                        ));
                    }
                    return Ok(operation.response.and_then(|r| r.name));
                }

                tokio::time::sleep(Duration::from_secs(1)).await;
                let url = format!("{}/{}", self.endpoint(), operation.name);
                operation = self
                    .http
                    .get(&url)
                    .bearer_auth(&self.access_token)
                    .send()
                    .await
                    .map_err(|e| RegistryError::Create(e.to_string()))?
                    .json()
                    .await
                    .map_err(|e| RegistryError::Create(e.to_string()))?;
            }
        })
        .await
        .map_err(|_| RegistryError::CreateTimeout(CREATE_WAIT))?
    }
}

/// Primary transcriber: FLAC in, best-alternative transcript out. Unconfigured
/// credentials simply disable this path.
pub struct CloudTranscriber {
    inner: Option<CloudInner>,
}

struct CloudInner {
    api: SpeechV2Api,
    registry: RecognizerRegistry,
    logical_id: String,
    config: RecognizerConfig,
}

impl CloudTranscriber {
    pub fn new(http: reqwest::Client, cloud: Option<CloudConfig>, language: &str) -> Self {
        let inner = cloud.map(|cloud| {
            let api = SpeechV2Api::new(http, &cloud);
            let registry = RecognizerRegistry::new(
                Box::new(api.clone()),
                cloud.project_id.clone(),
                cloud.region.clone(),
            );
            CloudInner {
                api,
                registry,
                logical_id: format!("voxnote-{}", language.to_lowercase()),
                config: RecognizerConfig::for_language(language),
            }
        });
        CloudTranscriber { inner }
    }
}

#[async_trait]
impl PrimaryTranscriber for CloudTranscriber {
    async fn transcribe(&self, audio: &[u8]) -> Option<String> {
        let Some(inner) = &self.inner else {
            debug!("Cloud speech credentials not configured, skipping primary");
            return None;
        };

        let recognizer = match inner.registry.resolve(&inner.logical_id, &inner.config).await {
            Ok(name) => name,
            Err(e) => {
                warn!("Recognizer resolution failed: {}", e);
                return None;
            }
        };

        match inner.api.recognize(&recognizer, audio).await {
            Ok(Some(text)) => Some(text),
            Ok(None) => {
                info!("Cloud recognizer returned no results");
                None
            }
            Err(e) => {
                error!("Cloud recognition failed: {}", e);
                None
            }
        }
    }
}

fn join_results(response: &RecognizeResponse) -> Option<String> {
    let joined = response
        .results
        .iter()
        .filter_map(|r| r.alternatives.first())
        .map(|a| a.transcript.as_str())
        .collect::<Vec<_>>()
        .join(" ");
    let joined = joined.trim().to_owned();
    if joined.is_empty() {
        None
    } else {
        Some(joined)
    }
}

/// A creation attempt is warranted only on this exact signal; anything else is
/// surfaced as a lookup failure.
fn is_not_found(status: StatusCode, body: &str) -> bool {
    if status != StatusCode::NOT_FOUND {
        return false;
    }
    serde_json::from_str::<ErrorBody>(body)
        .map(|b| b.error.status.as_deref() == Some("NOT_FOUND"))
        .unwrap_or(false)
}

#[derive(Debug, Deserialize)]
struct RecognizeResponse {
    #[serde(default)]
    results: Vec<SpeechResult>,
}

#[derive(Debug, Deserialize)]
struct SpeechResult {
    #[serde(default)]
    alternatives: Vec<SpeechAlternative>,
}

#[derive(Debug, Deserialize)]
struct SpeechAlternative {
    #[serde(default)]
    transcript: String,
}

#[derive(Debug, Deserialize)]
struct RecognizerResource {
    name: String,
}

#[derive(Debug, Deserialize)]
struct Operation {
    #[serde(default)]
    name: String,
    #[serde(default)]
    done: bool,
    response: Option<OperationResponse>,
    error: Option<StatusBody>,
}

#[derive(Debug, Deserialize)]
struct OperationResponse {
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: StatusBody,
}

#[derive(Debug, Deserialize)]
struct StatusBody {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    status: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alternatives_join_in_backend_order() {
        let response: RecognizeResponse = serde_json::from_str(
            r#"{
                "results": [
                    { "alternatives": [ { "transcript": "hello" }, { "transcript": "yellow" } ] },
                    { "alternatives": [ { "transcript": "world" } ] }
                ]
            }"#,
        )
        .unwrap();
        assert_eq!(join_results(&response).unwrap(), "hello world");
    }

    #[test]
    fn empty_results_yield_none() {
        let response: RecognizeResponse = serde_json::from_str(r#"{ "results": [] }"#).unwrap();
        assert!(join_results(&response).is_none());

        let response: RecognizeResponse = serde_json::from_str("{}").unwrap();
        assert!(join_results(&response).is_none());
    }

    #[test]
    fn blank_transcripts_yield_none() {
        let response: RecognizeResponse = serde_json::from_str(
            r#"{ "results": [ { "alternatives": [ { "transcript": "  " } ] } ] }"#,
        )
        .unwrap();
        assert!(join_results(&response).is_none());
    }

    #[test]
    fn results_without_alternatives_are_skipped() {
        let response: RecognizeResponse = serde_json::from_str(
            r#"{
                "results": [
                    { "alternatives": [] },
                    { "alternatives": [ { "transcript": "ok" } ] }
                ]
            }"#,
        )
        .unwrap();
        assert_eq!(join_results(&response).unwrap(), "ok");
    }

    #[test]
    fn not_found_requires_exact_status() {
        let not_found = r#"{ "error": { "code": 404, "message": "x", "status": "NOT_FOUND" } }"#;
        assert!(is_not_found(StatusCode::NOT_FOUND, not_found));

        let permission = r#"{ "error": { "code": 403, "message": "x", "status": "PERMISSION_DENIED" } }"#;
        assert!(!is_not_found(StatusCode::FORBIDDEN, permission));

        // 404 with an unparseable body is not a precise signal.
        assert!(!is_not_found(StatusCode::NOT_FOUND, "<html>gateway</html>"));
    }

    #[tokio::test]
    async fn unconfigured_transcriber_returns_none() {
        let transcriber = CloudTranscriber::new(reqwest::Client::new(), None, "en-US");
        assert!(transcriber.transcribe(b"flac-bytes").await.is_none());
    }
}
