// Public API for integration tests and potential library usage

pub mod api;
pub mod avatar;
pub mod config;
pub mod hub;
pub mod protocol;
pub mod session;
pub mod state;
pub mod ws;
