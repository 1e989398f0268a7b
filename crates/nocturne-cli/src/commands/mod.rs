pub mod config;
pub mod resolve;
pub mod token;
