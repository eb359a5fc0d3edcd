mod config;
mod core;
mod errors;
mod handlers;
mod loader;
mod util;

use crate::loader::run;

#[tokio::main]
async fn main() {
    dotenv::dotenv().ok();
    pretty_env_logger::init();
    println!("Bot starting...");

    match run().await {
        Ok(_) => println!("Bot stopped"),
        Err(e) => eprintln!("Error: {}", e),
    }
}
