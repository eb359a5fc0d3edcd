use teloxide::RequestError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MyError {
    #[error("Teloxide API Error: {0}")]
    Teloxide(#[from] RequestError),

    #[error("Reqwest Error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("Application Error: {0}")]
    Other(String),
}

impl From<&str> for MyError {
    fn from(s: &str) -> Self {
        MyError::Other(s.to_string())
    }
}

impl From<String> for MyError {
    fn from(s: String) -> Self {
        MyError::Other(s)
    }
}
