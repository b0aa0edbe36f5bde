//! Command-line interface.

use clap::{Parser, Subcommand};

/// Furniture storefront backend
#[derive(Parser)]
#[command(name = "shopfront")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Commands {
    /// Run the HTTP API and the background scheduler (default)
    #[command(alias = "daemon")]
    Serve,

    /// Delete expired refresh tokens once and exit
    SweepTokens,

    /// Write a default config.toml into the working directory
    Init,
}

impl Cli {
    #[must_use]
    pub fn command(&self) -> &Commands {
        self.command.as_ref().unwrap_or(&Commands::Serve)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serve_is_default() {
        let cli = Cli::parse_from(["shopfront"]);
        assert_eq!(cli.command(), &Commands::Serve);
    }

    #[test]
    fn test_subcommands_parse() {
        let cli = Cli::parse_from(["shopfront", "sweep-tokens"]);
        assert_eq!(cli.command(), &Commands::SweepTokens);

        let cli = Cli::parse_from(["shopfront", "daemon"]);
        assert_eq!(cli.command(), &Commands::Serve);
    }
}
