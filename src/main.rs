// ABOUTME: sshpick entry point: load hosts, let the user pick one, open an interactive shell on it
// ABOUTME: Every failure is reported once here as "Error: ..." with exit status 1

mod config;
mod diagnostics;
mod error;
mod fuzzy;
mod ssh;
mod terminal;
mod ui;

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;

use config::{Environment, Settings};
use diagnostics::Diagnostics;
use error::Error;
use ssh::parser::expand_tilde;
use ssh::{HostRecord, SessionManager, TerminalPrompter, parse_ssh_config};
use ui::{HostSelector, Picker, Selection};

#[derive(Parser, Debug)]
#[command(name = "sshpick", version)]
#[command(about = "Pick a host from your SSH config and open a shell on it")]
struct Cli {
    /// SSH config to read hosts from (defaults to ~/.ssh/config)
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Print connection and authentication details to stderr
    #[arg(short, long)]
    verbose: bool,

    /// Write a commented default settings file and exit
    #[arg(long)]
    init_settings: bool,

    /// Initial search query
    query: Vec<String>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let env = Environment::from_process();
    let diag = Diagnostics::new(cli.verbose || env.verbose);
    diag.install();

    match run(cli, env, diag) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli, env: Environment, diag: Diagnostics) -> Result<()> {
    if cli.init_settings {
        let path = Settings::default_config_path()?;
        Settings::save_default_config(&path)?;
        println!("Wrote default settings to {}", path.display());
        return Ok(());
    }

    let home = dirs::home_dir().ok_or(Error::HomeDir)?;
    let settings = load_settings(&home)?;

    let config_path = match cli.config {
        Some(path) => PathBuf::from(expand_tilde(&path.to_string_lossy(), Some(&home))),
        None => PathBuf::from(&settings.ssh.config_path),
    };
    let hosts = load_hosts(&config_path, diag)?;

    let displays: Vec<String> = hosts.iter().map(HostRecord::display).collect();
    let previews: Vec<String> = hosts.iter().map(HostRecord::preview).collect();
    let query = cli.query.join(" ");

    let mut picker = Picker::new(settings.ui.clone(), diag);
    let host = match picker.select(&displays, &previews, &query)? {
        Selection::Chosen(index) => hosts
            .get(index)
            .ok_or_else(|| Error::Selector(format!("selection {index} is out of range")))?,
        Selection::Cancelled => {
            diag.debug("Selection cancelled");
            return Ok(());
        }
    };

    println!("Connecting to {}...", host.name);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")?;

    let manager = SessionManager::new(settings.ssh, env, Arc::new(TerminalPrompter), diag);
    runtime.block_on(manager.run(host))?;
    Ok(())
}

fn load_settings(home: &Path) -> Result<Settings> {
    let path = Settings::default_config_path()?;
    let mut settings = Settings::load_or_default(&path)
        .with_context(|| format!("Failed to load settings from {}", path.display()))?;
    settings.expand_paths(Some(home))?;
    settings
        .validate()
        .map_err(|e| Error::Settings(e.to_string()))?;
    Ok(settings)
}

fn load_hosts(path: &Path, diag: Diagnostics) -> Result<Vec<HostRecord>> {
    let hosts = parse_ssh_config(path)?;
    if hosts.is_empty() {
        return Err(Error::ConfigEmpty {
            path: path.to_path_buf(),
        }
        .into());
    }
    diag.debug(&format!("Loaded {} hosts from {}", hosts.len(), path.display()));
    Ok(hosts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_cli_joins_query_words() {
        let cli = Cli::try_parse_from(["sshpick", "prod", "web"]).unwrap();
        assert_eq!(cli.query.join(" "), "prod web");
        assert!(!cli.verbose);
        assert!(cli.config.is_none());
    }

    #[test]
    fn test_cli_flags() {
        let cli = Cli::try_parse_from(["sshpick", "--config", "/tmp/cfg", "-v"]).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/cfg")));
        assert!(cli.verbose);
        assert!(cli.query.is_empty());
        assert!(!cli.init_settings);

        let cli = Cli::try_parse_from(["sshpick", "--init-settings"]).unwrap();
        assert!(cli.init_settings);
    }

    #[test]
    fn test_load_hosts_rejects_empty_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config");
        fs::write(&path, "Host *\n  User root\n").unwrap();

        let err = load_hosts(&path, Diagnostics::quiet()).unwrap_err();
        assert!(err.to_string().contains("no SSH hosts found"));
    }

    #[test]
    fn test_load_hosts_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_hosts(&dir.path().join("missing"), Diagnostics::quiet()).unwrap_err();
        assert!(err.to_string().contains("failed to read SSH config"));
    }

    #[test]
    fn test_load_hosts() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config");
        fs::write(&path, "# web tier\nHost web\n  HostName 10.0.0.5\n").unwrap();

        let hosts = load_hosts(&path, Diagnostics::quiet()).unwrap();
        assert_eq!(hosts.len(), 1);
        assert_eq!(hosts[0].comment.as_deref(), Some("web tier"));
    }
}
