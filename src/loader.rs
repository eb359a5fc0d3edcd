use std::sync::Arc;

use crate::config::Config;
use crate::core::services::cloud_speech::CloudTranscriber;
use crate::core::services::pipeline::SpeechPipeline;
use crate::core::services::web_speech::WebSpeechTranscriber;
use crate::errors::MyError;
use crate::handlers::commander::command_handlers;
use crate::handlers::messages::messager::messages_handlers;
use crate::util::enums::Command;
use log::info;
use teloxide::dispatching::{Dispatcher, HandlerExt, UpdateFilterExt};
use teloxide::dptree;
use teloxide::prelude::Requester;
use teloxide::types::Update;
use teloxide::utils::command::BotCommands;

pub async fn run() -> Result<(), MyError> {
    let config = Arc::new(Config::new());
    let pipeline = Arc::new(build_pipeline(&config));

    let command_menu = Command::bot_commands();
    config.get_bot().set_my_commands(command_menu).await?;

    let me = config.get_bot().get_me().await?;
    info!("Bot name: {:?}", me.username());

    let command_handler = Update::filter_message()
        .filter_command::<Command>()
        .endpoint(command_handlers);

    let message_handler = Update::filter_message().endpoint(messages_handlers);

    let handlers = dptree::entry()
        .branch(command_handler)
        .branch(message_handler);

    Dispatcher::builder(config.get_bot().clone(), handlers)
        .dependencies(dptree::deps![pipeline])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;
    Ok(())
}

/// The pipeline and its backend clients live for the whole process and are
/// shared across requests through the dispatcher's dependency map.
fn build_pipeline(config: &Config) -> SpeechPipeline {
    let primary = CloudTranscriber::new(
        config.get_http_client().clone(),
        config.get_cloud().cloned(),
        config.get_language(),
    );
    let fallback = WebSpeechTranscriber::new(
        config.get_http_client().clone(),
        config.get_speech_api_key().map(str::to_owned),
        config.get_language(),
    );
    SpeechPipeline::new(Box::new(primary), Box::new(fallback))
}
