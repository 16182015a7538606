pub mod config;
pub mod transfer;
