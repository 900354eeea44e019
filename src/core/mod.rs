pub mod chat_stream;
pub mod config;
pub mod functions;
pub mod reframe;
