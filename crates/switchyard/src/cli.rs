//! Command-line interface handling for the Switchyard binary.
//!
//! This module provides command-line argument parsing using the `clap`
//! builder API. Every option overrides the matching configuration file
//! setting.

use clap::{Arg, ArgAction, ArgMatches, Command};
use std::path::PathBuf;

/// Command line arguments parsed from user input.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CliArgs {
    /// Path to the configuration file
    pub config_path: PathBuf,
    /// Optional override for bind address
    pub bind_address: Option<String>,
    /// Optional override for log level
    pub log_level: Option<String>,
    /// Whether to force JSON log output
    pub json_logs: bool,
    /// Run as a client connecting to this URL instead of serving
    pub connect: Option<String>,
    /// Invite token presented when running as a client
    pub invite_token: Option<String>,
}

impl CliArgs {
    /// Parses the process arguments.
    pub fn parse() -> Self {
        Self::from_matches(&command().get_matches())
    }

    fn from_matches(matches: &ArgMatches) -> Self {
        Self {
            config_path: matches
                .get_one::<String>("config")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("switchyard.toml")),
            bind_address: matches.get_one::<String>("bind").cloned(),
            log_level: matches.get_one::<String>("log-level").cloned(),
            json_logs: matches.get_flag("json-logs"),
            connect: matches.get_one::<String>("connect").cloned(),
            invite_token: matches.get_one::<String>("invite-token").cloned(),
        }
    }
}

fn command() -> Command {
    Command::new("Switchyard")
        .version(env!("CARGO_PKG_VERSION"))
        .about("WebSocket session server with invite-based admission and sharding")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Configuration file path")
                .default_value("switchyard.toml"),
        )
        .arg(
            Arg::new("bind")
                .short('b')
                .long("bind")
                .value_name("ADDRESS")
                .help("Bind address (e.g., 127.0.0.1:5000)"),
        )
        .arg(
            Arg::new("log-level")
                .short('l')
                .long("log-level")
                .value_name("LEVEL")
                .help("Log level (trace, debug, info, warn, error)"),
        )
        .arg(
            Arg::new("json-logs")
                .long("json-logs")
                .help("Output logs in JSON format")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("connect")
                .long("connect")
                .value_name("URL")
                .help("Run a reconnecting client against URL instead of a server"),
        )
        .arg(
            Arg::new("invite-token")
                .short('t')
                .long("invite-token")
                .value_name("TOKEN")
                .requires("connect")
                .help("Invite token to present when connecting"),
        )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> CliArgs {
        CliArgs::from_matches(&command().get_matches_from(args))
    }

    #[test]
    fn defaults_to_server_mode() {
        let args = parse(&["switchyard"]);
        assert_eq!(args.config_path, PathBuf::from("switchyard.toml"));
        assert!(args.connect.is_none());
        assert!(!args.json_logs);
    }

    #[test]
    fn client_mode_with_token() {
        let args = parse(&[
            "switchyard",
            "--connect",
            "ws://127.0.0.1:5000/ws",
            "-t",
            "abc",
            "--json-logs",
            "-l",
            "debug",
        ]);
        assert_eq!(args.connect.as_deref(), Some("ws://127.0.0.1:5000/ws"));
        assert_eq!(args.invite_token.as_deref(), Some("abc"));
        assert_eq!(args.log_level.as_deref(), Some("debug"));
        assert!(args.json_logs);
    }

    #[test]
    fn token_requires_connect() {
        let result = command().try_get_matches_from(["switchyard", "--invite-token", "abc"]);
        assert!(result.is_err());
    }
}
