//! makecred - prints the bearer token for a username and password.
//!
//! The token is the standard base64 of `{"username": ..., "password": ...}`
//! and can be placed in a kubeconfig as the user's token.

use anyhow::{bail, Context, Result};
use clap::Parser;

use bouncer::classify::{classify, Credentials, TokenKind};

/// Encode Keystone credentials as a bouncer bearer token.
#[derive(Debug, Parser)]
#[command(name = "makecred", version = bouncer::VERSION)]
struct Cli {
    /// Keystone user name.
    username: String,

    /// Keystone password.
    #[arg(env = "BOUNCER_PASSWORD", hide_env_values = true)]
    password: String,
}

fn make_token(credentials: &Credentials) -> Result<String> {
    let token = credentials
        .encode()
        .context("failed to encode credentials")?;

    match classify(&token) {
        TokenKind::Credentials(decoded) if decoded == *credentials => Ok(token),
        TokenKind::Credentials(_) => bail!("encoded token does not decode to the same credentials"),
        TokenKind::TokenId | TokenKind::Unrecognized => {
            bail!("encoded token would not be recognized as credentials")
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let token = make_token(&Credentials::new(cli.username, cli.password))?;
    println!("{token}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_round_trips() {
        let credentials = Credentials::new("admin@example.com", "s3cr3t");
        let token = make_token(&credentials).unwrap();
        assert_eq!(
            bouncer::classify::decode_credentials(&token).unwrap(),
            credentials
        );
    }

    #[test]
    fn test_cli_definition() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
