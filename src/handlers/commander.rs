use crate::errors::MyError;
use crate::handlers::commands::start::start_handler;
use crate::util::enums::Command;
use log::error;
use teloxide::prelude::Message;
use teloxide::Bot;
use tokio::task;

pub(crate) async fn command_handlers(
    bot: Bot,
    message: Message,
    cmd: Command,
) -> Result<(), MyError> {
    task::spawn(async move {
        let result = match cmd {
            Command::Start => start_handler(bot, message).await,
        };
        if let Err(e) = result {
            error!("Command handler failed: {:?}", e);
        }
    });
    Ok(())
}
