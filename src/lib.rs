pub mod aws;
pub mod cli;
pub mod commands;
pub mod config;
pub mod constants;
pub mod engine;
pub mod error;
pub mod propagate;
pub mod totp;
