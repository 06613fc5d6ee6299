//! ppctl - Power Platform / Copilot Studio command-line client.
//!
//! Core library providing Azure AD authentication (PKCE browser and device
//! code flows, refresh-token persistence, token brokering) for the CLI.

pub mod auth;
pub mod cli;
pub mod commands;
pub mod config;
pub mod logging;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const NAME: &str = env!("CARGO_PKG_NAME");
