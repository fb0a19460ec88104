pub mod app;
pub mod chat_stream;
pub mod config;
pub mod export;
pub mod message;
pub mod models;
pub mod session;
pub mod session_store;
pub mod storage;
pub mod theme;
