pub mod api;
pub mod app;
pub mod config;
pub mod domain;
pub mod error;
pub mod output;
pub mod pagination;
pub mod processor;
pub mod store;
pub mod walker;
