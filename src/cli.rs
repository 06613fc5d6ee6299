//! CLI argument definitions using clap derive macros.

use clap::{Parser, Subcommand};

/// ppctl - Power Platform / Copilot Studio command-line client
#[derive(Parser)]
#[command(name = "ppctl")]
#[command(version)]
#[command(about = "Authenticate against Azure AD and call Power Platform APIs", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Sign in and persist a refresh token for a profile
    Login {
        /// Profile to sign in (defaults from config)
        #[arg(long)]
        profile: Option<String>,

        /// Tenant ID (defaults to the profile's configured tenant, or "common")
        #[arg(long)]
        tenant: Option<String>,

        /// Use the device code flow instead of the browser
        #[arg(long)]
        device_code: bool,

        /// Account hint pre-filled on the provider's sign-in page
        #[arg(long)]
        hint: Option<String>,
    },

    /// Remove a profile's stored credentials
    Logout {
        /// Profile to sign out (defaults from config)
        #[arg(long)]
        profile: Option<String>,
    },

    /// Show the login state of a profile
    Status {
        /// Profile to inspect (defaults from config)
        #[arg(long)]
        profile: Option<String>,
    },

    /// Print a bearer token for a resource to stdout
    Token {
        /// Resource (API audience) the token is for
        #[arg(long)]
        resource: Option<String>,

        /// Profile to act as (defaults from config)
        #[arg(long)]
        profile: Option<String>,
    },
}
