pub mod app;
pub mod chat;
pub mod config;
pub mod consumer;
pub mod context;
pub mod conversation;
pub mod corpus;
pub mod decode;
pub mod error;
pub mod handlers;
pub mod relay;
pub mod upstream;
