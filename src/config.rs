// ABOUTME: Application settings (TOML) and the environment snapshot taken once at startup
// ABOUTME: Components receive these values explicitly; nothing else reads the process environment

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::ssh::parser::expand_tilde;

pub const DEBUG_VAR: &str = "SSHPICK_DEBUG";
pub const DEFAULT_TERM: &str = "xterm-256color";

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct Settings {
    #[serde(default)]
    pub ssh: SshSettings,
    #[serde(default)]
    pub ui: UiSettings,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct SshSettings {
    #[serde(default = "default_config_path")]
    pub config_path: String,
    #[serde(default = "default_key_dir")]
    pub key_dir: String,
    #[serde(default = "default_term")]
    pub default_term: String,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct UiSettings {
    #[serde(default = "default_prompt")]
    pub prompt: String,
    #[serde(default = "default_header")]
    pub header: String,
    #[serde(default)]
    pub case_sensitive: bool,
    #[serde(default = "default_max_results")]
    pub max_results: usize,
}

fn default_config_path() -> String {
    "~/.ssh/config".to_string()
}

fn default_key_dir() -> String {
    "~/.ssh".to_string()
}

fn default_term() -> String {
    DEFAULT_TERM.to_string()
}

fn default_prompt() -> String {
    "SSH > ".to_string()
}

fn default_header() -> String {
    "Select a host to connect".to_string()
}

fn default_max_results() -> usize {
    200
}

impl Default for SshSettings {
    fn default() -> Self {
        SshSettings {
            config_path: default_config_path(),
            key_dir: default_key_dir(),
            default_term: default_term(),
        }
    }
}

impl Default for UiSettings {
    fn default() -> Self {
        UiSettings {
            prompt: default_prompt(),
            header: default_header(),
            case_sensitive: false,
            max_results: default_max_results(),
        }
    }
}

impl Settings {
    pub fn default_config_content() -> &'static str {
        r#"# sshpick configuration

[ssh]
# OpenSSH client config to read hosts from
config_path = "~/.ssh/config"
# Directory searched for id_ed25519, id_rsa, id_ecdsa and id_dsa
key_dir = "~/.ssh"
# Terminal type sent to the server when $TERM is unset
default_term = "xterm-256color"

[ui]
prompt = "SSH > "
header = "Select a host to connect"
case_sensitive = false
max_results = 200
"#
    }

    pub fn load_from_str(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse configuration")
    }

    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read configuration file: {}", path.display()))?;
        Self::load_from_str(&content)
    }

    /// Settings from `path` if it exists, defaults otherwise.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load_from_file(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Writes the commented default settings to `path`. An existing file is left alone.
    pub fn save_default_config(path: &Path) -> Result<()> {
        if path.exists() {
            anyhow::bail!("Settings file already exists: {}", path.display());
        }

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {}", parent.display()))?;
        }

        fs::write(path, Self::default_config_content())
            .with_context(|| format!("Failed to write default config to: {}", path.display()))?;

        Ok(())
    }

    pub fn default_config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir().context("Failed to determine config directory")?;
        Ok(config_dir.join("sshpick").join("config.toml"))
    }

    pub fn expand_paths(&mut self, home: Option<&Path>) -> Result<()> {
        self.ssh.config_path = expand_required(&self.ssh.config_path, home)?;
        self.ssh.key_dir = expand_required(&self.ssh.key_dir, home)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.ssh.config_path.is_empty() {
            anyhow::bail!("ssh.config_path cannot be empty");
        }

        if self.ssh.default_term.is_empty() {
            anyhow::bail!("ssh.default_term cannot be empty");
        }

        if self.ui.max_results == 0 {
            anyhow::bail!("max_results must be greater than 0");
        }

        Ok(())
    }
}

fn expand_required(path: &str, home: Option<&Path>) -> Result<String> {
    if path.starts_with("~/") && home.is_none() {
        anyhow::bail!("Failed to determine home directory");
    }
    Ok(expand_tilde(path, home))
}

/// The environment variables this tool consults, read once in `main`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Environment {
    pub verbose: bool,
    pub agent_socket: Option<PathBuf>,
    pub term: Option<String>,
    pub user: Option<String>,
}

impl Environment {
    pub fn from_process() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|value| !value.is_empty());

        Self {
            verbose: get(DEBUG_VAR).is_some(),
            agent_socket: get("SSH_AUTH_SOCK").map(PathBuf::from),
            term: get("TERM"),
            user: get("USER"),
        }
    }
}
