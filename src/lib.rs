// Public API for integration tests and potential library usage

pub mod api;
pub mod config;
pub mod pipeline;
pub mod protocol;
pub mod resolver;
pub mod sanitize;
pub mod sports;
pub mod state;
pub mod timer;
pub mod types;
pub mod ws;
