pub mod cloud_speech;
pub mod pipeline;
pub mod recognizer;
pub mod transcode;
pub mod web_speech;
