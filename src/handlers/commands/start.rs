use crate::errors::MyError;
use teloxide::prelude::*;
use teloxide::types::ReplyParameters;

const WELCOME_TEXT: &str = "\
🎤 Welcome to the Voice-to-Text Bot!

Send me a voice message and I'll transcribe it to text for you.

Features:
• High accuracy speech recognition
• Fast processing
• Support for various audio qualities

Just send a voice message to get started!";

pub async fn start_handler(bot: Bot, message: Message) -> Result<(), MyError> {
    bot.send_message(message.chat.id, WELCOME_TEXT)
        .reply_parameters(ReplyParameters::new(message.id))
        .await?;
    Ok(())
}
