use teloxide::macros::BotCommands;

#[derive(BotCommands, Clone)]
#[command(rename_rule = "lowercase")]
pub enum Command {
    #[command(description = "show the welcome message")]
    Start,
}

pub struct AudioStruct {
    pub mime_type: String,
    pub file_id: String,
}
