//! Fallback recognition via the generic web speech endpoint: WAV in, one
//! recognize call out, with ambient-noise calibration applied first.

use async_trait::async_trait;
use log::{debug, error};
use reqwest::header::CONTENT_TYPE;

use crate::core::services::pipeline::FallbackTranscriber;
use crate::core::services::transcode::WavAudio;

const RECOGNIZE_URL: &str = "http://www.google.com/speech-api/v2/recognize";

/// Leading window used to estimate the noise floor.
const CALIBRATION_WINDOW_SECS: f32 = 0.5;
const DYNAMIC_ENERGY_RATIO: f32 = 1.5;

/// The three shapes a fallback attempt can take. This is the tagged form of
/// the classification the message layer renders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FallbackReply {
    Text(String),
    Unintelligible,
    ServiceError(String),
}

pub struct WebSpeechTranscriber {
    http: reqwest::Client,
    api_key: Option<String>,
    language: String,
}

impl WebSpeechTranscriber {
    pub fn new(http: reqwest::Client, api_key: Option<String>, language: &str) -> Self {
        WebSpeechTranscriber {
            http,
            api_key,
            language: language.to_owned(),
        }
    }
}

#[async_trait]
impl FallbackTranscriber for WebSpeechTranscriber {
    async fn transcribe(&self, wav: &[u8]) -> FallbackReply {
        let Some(api_key) = &self.api_key else {
            return FallbackReply::ServiceError(
                "speech service credentials are not configured".to_owned(),
            );
        };

        let audio = match WavAudio::from_bytes(wav) {
            Ok(audio) => audio,
            Err(e) => return FallbackReply::ServiceError(format!("bad waveform input: {e}")),
        };

        // Runs on every invocation; recognition accuracy depends on it.
        let calibrated = calibrate(audio);
        let body = calibrated.to_bytes();

        let response = self
            .http
            .post(RECOGNIZE_URL)
            .query(&[
                ("client", "chromium"),
                ("lang", self.language.as_str()),
                ("key", api_key.as_str()),
            ])
            .header(
                CONTENT_TYPE,
                format!("audio/wav; rate={}", calibrated.sample_rate),
            )
            .body(body)
            .send()
            .await;

        let response = match response {
            Ok(response) => response,
            Err(e) => {
                error!("Web speech request failed: {}", e);
                return FallbackReply::ServiceError(format!(
                    "speech recognition service: {e}"
                ));
            }
        };

        if !response.status().is_success() {
            return FallbackReply::ServiceError(format!(
                "speech recognition service: HTTP {}",
                response.status()
            ));
        }

        match response.text().await {
            Ok(raw) => parse_reply(&raw),
            Err(e) => FallbackReply::ServiceError(format!("speech recognition service: {e}")),
        }
    }
}

/// Estimate the noise floor from the leading window and drop the below-floor
/// lead-in, keeping a tenth of a second before the first speech-level sample.
fn calibrate(mut audio: WavAudio) -> WavAudio {
    let window = (audio.sample_rate as f32 * CALIBRATION_WINDOW_SECS) as usize;
    let window = window.min(audio.samples.len());
    if window == 0 {
        return audio;
    }

    let threshold = rms(&audio.samples[..window]) * DYNAMIC_ENERGY_RATIO;
    debug!("Ambient noise threshold: {:.1}", threshold);

    let Some(first_loud) = audio
        .samples
        .iter()
        .position(|&s| f32::from(s).abs() > threshold)
    else {
        return audio;
    };
    let start = first_loud.saturating_sub(audio.sample_rate as usize / 10);
    audio.samples.drain(..start);
    audio
}

fn rms(samples: &[i16]) -> f32 {
    let sum: f32 = samples.iter().map(|&s| f32::from(s) * f32::from(s)).sum();
    (sum / samples.len() as f32).sqrt()
}

/// The endpoint answers with one JSON object per line; the first non-empty
/// result wins. No decodable words at all means the audio was unintelligible.
fn parse_reply(raw: &str) -> FallbackReply {
    for line in raw.lines().filter(|l| !l.trim().is_empty()) {
        let Ok(value) = serde_json::from_str::<serde_json::Value>(line) else {
            continue;
        };
        let Some(results) = value.get("result").and_then(|r| r.as_array()) else {
            continue;
        };
        for result in results {
            let transcript = result
                .get("alternative")
                .and_then(|a| a.as_array())
                .and_then(|a| a.first())
                .and_then(|alt| alt.get("transcript"))
                .and_then(|t| t.as_str())
                .unwrap_or("");
            if !transcript.trim().is_empty() {
                return FallbackReply::Text(transcript.to_owned());
            }
        }
    }
    FallbackReply::Unintelligible
}
