use std::sync::Arc;

use crate::core::services::pipeline::SpeechPipeline;
use crate::errors::MyError;
use crate::handlers::messages::sound::voice::voice_handler;
use log::error;
use teloxide::prelude::*;
use teloxide::types::ReplyParameters;

/// Message router. Voice messages run the pipeline in their own task so a
/// slow transcription never stalls the dispatch loop; anything that goes
/// wrong inside that task is reported back to the chat, never propagated.
pub(crate) async fn messages_handlers(
    bot: Bot,
    message: Message,
    pipeline: Arc<SpeechPipeline>,
) -> Result<(), MyError> {
    if message.voice().is_some() {
        tokio::spawn(async move {
            if let Err(e) = voice_handler(&bot, &message, &pipeline).await {
                error!("Error processing voice message: {:?}", e);
                let _ = bot
                    .send_message(message.chat.id, format!("❌ An error occurred: {}", e))
                    .reply_parameters(ReplyParameters::new(message.id))
                    .await;
            }
        });
        return Ok(());
    }

    if message.text().is_some() {
        bot.send_message(
            message.chat.id,
            "Please send me a voice message to transcribe! 🎤",
        )
        .reply_parameters(ReplyParameters::new(message.id))
        .await?;
    }

    Ok(())
}
