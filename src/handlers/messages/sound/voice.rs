use crate::core::services::pipeline::{SpeechPipeline, TranscriptionOutcome};
use crate::errors::MyError;
use crate::util::enums::AudioStruct;
use crate::util::split_text;
use bytes::Bytes;
use teloxide::prelude::*;
use teloxide::types::{FileId, ReplyParameters};

pub async fn voice_handler(
    bot: &Bot,
    msg: &Message,
    pipeline: &SpeechPipeline,
) -> Result<(), MyError> {
    let status = bot
        .send_message(msg.chat.id, "🎧 Processing your voice message...")
        .reply_parameters(ReplyParameters::new(msg.id))
        .await
        .ok();

    let Some(status) = status else { return Ok(()) };

    let Some(file) = get_voice_file(msg) else {
        bot.edit_message_text(
            msg.chat.id,
            status.id,
            "❌ Could not find the voice message.",
        )
        .await?;
        return Ok(());
    };

    let file_data = save_file_to_memory(bot, &file.file_id).await?;
    let outcome = pipeline.run(&file_data, &file.mime_type).await;

    match outcome {
        TranscriptionOutcome::Success(text) => {
            let text_parts = split_text(&text, 4000);
            bot.edit_message_text(
                msg.chat.id,
                status.id,
                format!("📝 Transcription:\n\n{}", text_parts[0]),
            )
            .await?;
            for part in text_parts.iter().skip(1) {
                bot.send_message(msg.chat.id, part.clone())
                    .reply_parameters(ReplyParameters::new(msg.id))
                    .await?;
            }
        }
        TranscriptionOutcome::Unintelligible => {
            bot.edit_message_text(msg.chat.id, status.id, "❌ Could not understand the audio")
                .await?;
        }
        TranscriptionOutcome::ServiceError(detail) => {
            bot.edit_message_text(msg.chat.id, status.id, format!("❌ {}", detail))
                .await?;
        }
    }

    Ok(())
}

fn get_voice_file(msg: &Message) -> Option<AudioStruct> {
    let voice = msg.voice()?;
    Some(AudioStruct {
        mime_type: voice
            .mime_type
            .as_ref()
            .map(|m| m.essence_str().to_owned())
            .unwrap_or_else(|| "audio/ogg".to_owned()),
        file_id: voice.file.id.0.clone(),
    })
}

pub async fn save_file_to_memory(bot: &Bot, file_id: &str) -> Result<Bytes, MyError> {
    let file = bot.get_file(FileId(file_id.to_string())).send().await?;
    let file_url = format!(
        "https://api.telegram.org/file/bot{}/{}",
        bot.token(),
        file.path
    );
    let response = reqwest::get(file_url).await?;
    Ok(response.bytes().await?)
}
