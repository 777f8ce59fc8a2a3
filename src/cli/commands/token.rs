use anyhow::Context;
use clap::Subcommand;
use serde_json::json;
use std::time::Duration;

use crate::auth::{Identity, Role, TokenService};
use crate::cli::output::output_success;
use crate::cli::OutputFormat;
use crate::config::SecurityConfig;

#[derive(Subcommand)]
pub enum TokenCommands {
    #[command(about = "Mint an access token")]
    Issue {
        #[arg(long, help = "User id the token speaks for")]
        user_id: u64,
        #[arg(long, help = "admin, convener, facilitator or learner")]
        role: Role,
        #[arg(long, help = "Email claim")]
        email: Option<String>,
        #[arg(long, help = "Lifetime in seconds (defaults to ACCESS_TOKEN_TTL_SECS)")]
        ttl_secs: Option<u64>,
    },

    #[command(about = "Verify a token and print its claims")]
    Inspect {
        #[arg(help = "Access token")]
        token: String,
    },

    #[command(about = "Re-issue a still-valid token with a fresh expiry")]
    Refresh {
        #[arg(help = "Access token")]
        token: String,
    },
}

pub fn handle(cmd: TokenCommands, security: &SecurityConfig, output_format: OutputFormat) -> anyhow::Result<()> {
    if security.access_token_secret.is_empty() {
        anyhow::bail!("ACCESS_TOKEN_SECRET must be set");
    }
    let tokens = TokenService::from_config(security);

    match cmd {
        TokenCommands::Issue {
            user_id,
            role,
            email,
            ttl_secs,
        } => {
            let mut identity = Identity::new(user_id, role);
            if let Some(email) = email {
                identity = identity.with_email(email);
            }
            let ttl = ttl_secs.map(Duration::from_secs).unwrap_or_else(|| tokens.default_ttl());
            let token = tokens.create(identity, ttl)?;
            output_success(
                output_format,
                &format!("Issued {} token for user {}", role, user_id),
                Some(json!({ "token": token, "expires_in": ttl.as_secs() })),
            )
        }
        TokenCommands::Inspect { token } => {
            let claims = tokens.verify(&token).context("token rejected")?;
            output_success(output_format, "Token is valid", Some(serde_json::to_value(&claims)?))
        }
        TokenCommands::Refresh { token } => {
            let claims = tokens.verify(&token).context("token rejected")?;
            let token = tokens.refresh(&claims)?;
            output_success(
                output_format,
                &format!("Refreshed token for user {}", claims.identity.user_id),
                Some(json!({ "token": token, "expires_in": tokens.default_ttl().as_secs() })),
            )
        }
    }
}
