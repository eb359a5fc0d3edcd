//! The voice pipeline: transcode, try the cloud recognizer, fall back to the
//! web recognizer, and normalize everything into one outcome.

use async_trait::async_trait;
use log::warn;

use crate::core::services::transcode;
use crate::core::services::web_speech::FallbackReply;

/// Reply text when neither target format could be produced.
pub const CONVERT_ERROR_TEXT: &str = "Error converting audio format";

/// The single result a voice message resolves to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TranscriptionOutcome {
    Success(String),
    Unintelligible,
    ServiceError(String),
}

/// Language-specific cloud recognition. `None` covers every failure mode:
/// unresolved recognizer, transport errors, and empty results.
#[async_trait]
pub trait PrimaryTranscriber: Send + Sync {
    async fn transcribe(&self, audio: &[u8]) -> Option<String>;
}

/// Generic recognition; always answers with one of the three reply shapes.
#[async_trait]
pub trait FallbackTranscriber: Send + Sync {
    async fn transcribe(&self, audio: &[u8]) -> FallbackReply;
}

pub struct SpeechPipeline {
    primary: Box<dyn PrimaryTranscriber>,
    fallback: Box<dyn FallbackTranscriber>,
}

impl SpeechPipeline {
    pub fn new(
        primary: Box<dyn PrimaryTranscriber>,
        fallback: Box<dyn FallbackTranscriber>,
    ) -> Self {
        SpeechPipeline { primary, fallback }
    }

    /// One run per voice message. Never errors; the caller always gets exactly
    /// one outcome to render.
    pub async fn run(&self, blob: &[u8], mime_type: &str) -> TranscriptionOutcome {
        let flac = match transcode::to_flac(blob, mime_type) {
            Ok(buffer) => Some(buffer),
            Err(e) => {
                warn!("FLAC transcode failed: {}", e);
                None
            }
        };
        let wav = match transcode::to_wav(blob, mime_type) {
            Ok(buffer) => Some(buffer),
            Err(e) => {
                warn!("WAV transcode failed: {}", e);
                None
            }
        };

        if let Some(flac) = &flac {
            if let Some(text) = self.primary.transcribe(flac).await {
                if !text.trim().is_empty() {
                    return TranscriptionOutcome::Success(text);
                }
            }
        }

        let Some(wav) = &wav else {
            return TranscriptionOutcome::ServiceError(CONVERT_ERROR_TEXT.to_owned());
        };

        match self.fallback.transcribe(wav).await {
            FallbackReply::Text(text) if !text.trim().is_empty() => {
                TranscriptionOutcome::Success(text)
            }
            FallbackReply::Text(_) | FallbackReply::Unintelligible => {
                TranscriptionOutcome::Unintelligible
            }
            FallbackReply::ServiceError(detail) => TranscriptionOutcome::ServiceError(detail),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::services::transcode::tests::tone_wav;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct FakePrimary {
        reply: Option<String>,
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl PrimaryTranscriber for FakePrimary {
        async fn transcribe(&self, _audio: &[u8]) -> Option<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.reply.clone()
        }
    }

    struct FakeFallback {
        reply: FallbackReply,
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl FallbackTranscriber for FakeFallback {
        async fn transcribe(&self, _audio: &[u8]) -> FallbackReply {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.reply.clone()
        }
    }

    struct Calls {
        primary: Arc<AtomicUsize>,
        fallback: Arc<AtomicUsize>,
    }

    fn pipeline(primary: Option<String>, fallback: FallbackReply) -> (SpeechPipeline, Calls) {
        let calls = Calls {
            primary: Arc::new(AtomicUsize::new(0)),
            fallback: Arc::new(AtomicUsize::new(0)),
        };
        let pipeline = SpeechPipeline::new(
            Box::new(FakePrimary {
                reply: primary,
                calls: calls.primary.clone(),
            }),
            Box::new(FakeFallback {
                reply: fallback,
                calls: calls.fallback.clone(),
            }),
        );
        (pipeline, calls)
    }

    fn speech_blob() -> Vec<u8> {
        tone_wav(16_000, 1, 1600)
    }

    #[tokio::test]
    async fn primary_success_skips_fallback() {
        let (pipeline, calls) = pipeline(
            Some("some deterministic text".to_owned()),
            FallbackReply::Text("unreached".to_owned()),
        );

        let outcome = pipeline.run(&speech_blob(), "audio/wav").await;

        assert_eq!(
            outcome,
            TranscriptionOutcome::Success("some deterministic text".to_owned())
        );
        assert_eq!(calls.primary.load(Ordering::SeqCst), 1);
        assert_eq!(calls.fallback.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn primary_failure_falls_back() {
        let (pipeline, calls) = pipeline(None, FallbackReply::Text("hello there".to_owned()));

        let outcome = pipeline.run(&speech_blob(), "audio/wav").await;

        assert_eq!(
            outcome,
            TranscriptionOutcome::Success("hello there".to_owned())
        );
        assert_eq!(calls.primary.load(Ordering::SeqCst), 1);
        assert_eq!(calls.fallback.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn empty_primary_text_is_not_a_success() {
        let (pipeline, calls) = pipeline(
            Some("  ".to_owned()),
            FallbackReply::Text("fallback text".to_owned()),
        );

        let outcome = pipeline.run(&speech_blob(), "audio/wav").await;

        assert_eq!(
            outcome,
            TranscriptionOutcome::Success("fallback text".to_owned())
        );
        assert_eq!(calls.fallback.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn silence_on_both_backends_is_unintelligible() {
        let (pipeline, _) = pipeline(None, FallbackReply::Unintelligible);

        let outcome = pipeline.run(&speech_blob(), "audio/wav").await;

        assert_eq!(outcome, TranscriptionOutcome::Unintelligible);
    }

    #[tokio::test]
    async fn empty_fallback_text_is_unintelligible() {
        let (pipeline, _) = pipeline(None, FallbackReply::Text(String::new()));

        let outcome = pipeline.run(&speech_blob(), "audio/wav").await;

        assert_eq!(outcome, TranscriptionOutcome::Unintelligible);
    }

    #[tokio::test]
    async fn fallback_service_error_carries_detail() {
        let (pipeline, _) = pipeline(
            None,
            FallbackReply::ServiceError("recognition quota exceeded".to_owned()),
        );

        let outcome = pipeline.run(&speech_blob(), "audio/wav").await;

        assert_eq!(
            outcome,
            TranscriptionOutcome::ServiceError("recognition quota exceeded".to_owned())
        );
    }

    #[tokio::test]
    async fn corrupt_input_is_a_conversion_error() {
        let (pipeline, calls) = pipeline(
            Some("unreached".to_owned()),
            FallbackReply::Text("unreached".to_owned()),
        );

        let outcome = pipeline.run(b"definitely not audio", "audio/ogg").await;

        assert_eq!(
            outcome,
            TranscriptionOutcome::ServiceError(CONVERT_ERROR_TEXT.to_owned())
        );
        // Neither backend is reachable without a transcoded buffer.
        assert_eq!(calls.primary.load(Ordering::SeqCst), 0);
        assert_eq!(calls.fallback.load(Ordering::SeqCst), 0);
    }
}
