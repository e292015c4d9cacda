pub mod config;
pub mod data_url;
pub mod editor;
pub mod error;
pub mod http_server;
pub mod image_gen;
pub mod prompts;
pub mod session;
