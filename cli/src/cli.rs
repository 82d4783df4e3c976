// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

use std::{error::Error, ffi::OsString, path::PathBuf};

use cardamom_carddav::CardDavConfig;
use clap::{ArgMatches, Command, ValueHint, arg, builder::styling, crate_version, value_parser};
use colored::Colorize;
use tracing_subscriber::EnvFilter;

use crate::cmd_discover::CmdDiscover;
use crate::cmd_query::CmdQuery;
use crate::cmd_sync::CmdSync;
use crate::config::{Overrides, parse_config};

const APP_NAME: &str = "cardamom";

/// Run the Cardamom command-line interface.
pub async fn run() -> Result<(), Box<dyn Error>> {
    let cli = match Cli::parse() {
        Ok(cli) => cli,
        Err(e) => {
            eprintln!("{} {}", "Error:".red(), e);
            std::process::exit(2);
        }
    };

    init_tracing(cli.verbose);
    if let Err(e) = cli.run().await {
        eprintln!("{} {}", "Error:".red(), e);
        std::process::exit(1);
    }
    Ok(())
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Command-line interface
#[derive(Debug)]
pub struct Cli {
    /// Path to the configuration file
    pub config: Option<PathBuf>,

    /// Server and credentials given on the command line
    pub overrides: Overrides,

    /// Enable debug logging
    pub verbose: bool,

    /// The command to execute
    pub command: Commands,
}

impl Cli {
    /// Create the command-line interface
    pub fn command() -> Command {
        const STYLES: styling::Styles = styling::Styles::styled()
            .header(styling::AnsiColor::Green.on_default().bold())
            .usage(styling::AnsiColor::Green.on_default().bold())
            .literal(styling::AnsiColor::Blue.on_default().bold())
            .placeholder(styling::AnsiColor::Cyan.on_default());

        Command::new(APP_NAME)
            .about("Discover, synchronize and query CardDAV address books.")
            .author("Zexin Yuan <aim@yzx9.xyz>")
            .version(crate_version!())
            .styles(STYLES)
            .subcommand_required(true)
            .arg_required_else_help(true)
            .arg(
                arg!(-c --config [CONFIG] "Path to the configuration file")
                    .long_help(
                        "\
Path to the configuration file. Defaults to the CARDAMOM_CONFIG environment variable; without \
either, the server is taken from the command line and CARDAMOM_* variables.",
                    )
                    .value_parser(value_parser!(PathBuf))
                    .value_hint(ValueHint::FilePath),
            )
            .arg(
                arg!(-s --server [URL] "Server domain, discovery URL or collection URL")
                    .value_hint(ValueHint::Url),
            )
            .arg(arg!(-u --username [USERNAME] "Username for basic authentication"))
            .arg(arg!(-p --password [PASSWORD] "Password for basic authentication"))
            .arg(arg!(--token [TOKEN] "Bearer token, replaces basic authentication"))
            .arg(arg!(-v --verbose "Enable debug logging"))
            .subcommand(CmdDiscover::command())
            .subcommand(CmdSync::command())
            .subcommand(CmdQuery::command())
    }

    /// Parse the command-line arguments
    pub fn parse() -> Result<Self, Box<dyn Error>> {
        let commands = Self::command();
        let matches = commands.get_matches();
        Self::from(&matches)
    }

    /// Parse the specified arguments
    pub fn try_parse_from<I, T>(args: I) -> Result<Self, Box<dyn Error>>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        let commands = Self::command();
        let matches = commands.try_get_matches_from(args)?;
        Self::from(&matches)
    }

    /// Create a CLI instance from the `ArgMatches`
    pub fn from(matches: &ArgMatches) -> Result<Self, Box<dyn Error>> {
        let command = match matches.subcommand() {
            Some((CmdDiscover::NAME, matches)) => Commands::Discover(CmdDiscover::from(matches)),
            Some((CmdSync::NAME, matches)) => Commands::Sync(CmdSync::from(matches)),
            Some((CmdQuery::NAME, matches)) => Commands::Query(CmdQuery::from(matches)?),
            Some((name, _)) => return Err(format!("Unknown command: {name}").into()),
            None => return Err("No command given".into()),
        };

        let overrides = Overrides {
            server: matches.get_one::<String>("server").cloned(),
            username: matches.get_one::<String>("username").cloned(),
            password: matches.get_one::<String>("password").cloned(),
            token: matches.get_one::<String>("token").cloned(),
        };

        Ok(Cli {
            config: matches.get_one("config").cloned(),
            overrides,
            verbose: matches.get_flag("verbose"),
            command,
        })
    }

    /// Run the command
    pub async fn run(self) -> Result<(), Box<dyn Error>> {
        tracing::debug!("Parsing configuration...");
        let config = parse_config(self.config, &self.overrides).await?;
        self.command.run(config).await
    }
}

/// The commands available in the CLI
#[derive(Debug, Clone)]
pub enum Commands {
    /// Find the address books of the account
    Discover(CmdDiscover),

    /// Synchronize an address book into a local state file
    Sync(CmdSync),

    /// Search an address book with a filter
    Query(CmdQuery),
}

impl Commands {
    /// Run the command with the given configuration
    pub async fn run(self, config: CardDavConfig) -> Result<(), Box<dyn Error>> {
        match self {
            Commands::Discover(a) => a.run(config).await,
            Commands::Sync(a) => a.run(config).await,
            Commands::Query(a) => a.run(config).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_config() {
        let cli = Cli::try_parse_from(vec!["test", "-c", "/tmp/config.toml", "discover"]).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/config.toml")));
        assert!(matches!(cli.command, Commands::Discover(_)));
        assert!(!cli.verbose);
    }

    #[test]
    fn test_parse_overrides() {
        let args = vec![
            "test",
            "--server",
            "example.com",
            "-u",
            "jane",
            "-p",
            "secret",
            "-v",
            "discover",
        ];
        let cli = Cli::try_parse_from(args).unwrap();
        assert_eq!(cli.overrides.server.as_deref(), Some("example.com"));
        assert_eq!(cli.overrides.username.as_deref(), Some("jane"));
        assert_eq!(cli.overrides.password.as_deref(), Some("secret"));
        assert_eq!(cli.overrides.token, None);
        assert!(cli.verbose);
    }

    #[test]
    fn test_parse_requires_command() {
        assert!(Cli::try_parse_from(vec!["test"]).is_err());
    }

    #[test]
    fn test_parse_sync() {
        let cli = Cli::try_parse_from(vec![
            "test",
            "sync",
            "/addressbooks/jane/contacts/",
            "--state",
            "/tmp/state.json",
        ])
        .unwrap();
        match cli.command {
            Commands::Sync(cmd) => {
                assert_eq!(cmd.collection, "/addressbooks/jane/contacts/");
                assert_eq!(cmd.state, Some(PathBuf::from("/tmp/state.json")));
            }
            other => panic!("Expected sync command, got {other:?}"),
        }
    }
}
