pub mod api;
pub mod client;
pub mod config;
pub mod core;
pub mod logging;
