// ABOUTME: Line-oriented parser that turns an OpenSSH client config into selectable host records
// ABOUTME: Skips wildcard Host blocks and attaches the preceding # comment to each host

use crate::error::{Error, Result};
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_PORT: &str = "22";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HostRecord {
    pub name: String,
    pub host_name: Option<String>,
    pub port: String,
    pub user: Option<String>,
    pub comment: Option<String>,
    pub identity_file: Option<PathBuf>,
}

impl HostRecord {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            host_name: None,
            port: DEFAULT_PORT.to_string(),
            user: None,
            comment: None,
            identity_file: None,
        }
    }

    /// Address to dial: `HostName` if configured, else the alias itself.
    pub fn address(&self) -> &str {
        self.host_name.as_deref().unwrap_or(&self.name)
    }

    /// One-line summary shown in the picker list.
    pub fn display(&self) -> String {
        let mut info = format!("{:<20}", self.name);
        if let Some(user) = &self.user {
            info.push_str(&format!(" user={user:<10}"));
        }
        if let Some(host_name) = &self.host_name {
            info.push_str(&format!(" host={host_name:<20}"));
        }
        if !self.port.is_empty() && self.port != DEFAULT_PORT {
            info.push_str(&format!(" port={}", self.port));
        }
        if let Some(comment) = &self.comment {
            info.push_str(&format!(" ({comment})"));
        }
        info
    }

    /// Multi-line details shown in the picker's preview pane.
    pub fn preview(&self) -> String {
        let identity = self
            .identity_file
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_default();
        format!(
            "{:<10}{}\n{:<10}{}\n{:<10}{}\n{:<10}{}\n{:<10}{}\n{:<10}{}",
            "Name:",
            self.name,
            "Host:",
            self.host_name.as_deref().unwrap_or_default(),
            "User:",
            self.user.as_deref().unwrap_or_default(),
            "Port:",
            self.port,
            "Key:",
            identity,
            "Comment:",
            self.comment.as_deref().unwrap_or_default(),
        )
    }
}

pub fn parse_ssh_config(path: &Path) -> Result<Vec<HostRecord>> {
    let content = fs::read_to_string(path).map_err(|source| Error::ConfigIo {
        path: path.to_path_buf(),
        source,
    })?;

    let home = dirs::home_dir();
    Ok(parse_ssh_config_content(&content, home.as_deref()))
}

pub fn parse_ssh_config_content(content: &str, home: Option<&Path>) -> Vec<HostRecord> {
    let mut hosts = Vec::new();
    let mut current: Option<HostRecord> = None;
    let mut pending_comment: Option<String> = None;

    for line in content.lines() {
        let line = line.trim();

        if let Some(comment) = line.strip_prefix('#') {
            pending_comment = Some(comment.trim().to_string());
            continue;
        }

        // Blank lines keep the pending comment alive
        if line.is_empty() {
            continue;
        }

        if let Some(pattern) = host_pattern(line) {
            if let Some(host) = current.take() {
                hosts.push(host);
            }

            if is_wildcard(pattern) {
                pending_comment = None;
                continue;
            }

            let mut host = HostRecord::new(pattern);
            host.comment = pending_comment.take().filter(|c| !c.is_empty());
            current = Some(host);
            continue;
        }

        let Some(host) = current.as_mut() else {
            continue;
        };

        let Some((key, value)) = split_key_value(line) else {
            continue;
        };

        match key.as_str() {
            "hostname" => host.host_name = Some(value.to_string()),
            "port" => host.port = value.to_string(),
            "user" => host.user = Some(value.to_string()),
            "identityfile" => host.identity_file = Some(PathBuf::from(expand_tilde(value, home))),
            _ => {
                // Everything else (ProxyJump, ServerAliveInterval, ...) is not ours to interpret
            }
        }
    }

    if let Some(host) = current {
        hosts.push(host);
    }

    hosts
}

/// Returns the pattern of a `Host <pattern>` line; the keyword is case-insensitive.
fn host_pattern(line: &str) -> Option<&str> {
    let keyword = line.get(..4)?;
    if !keyword.eq_ignore_ascii_case("host") {
        return None;
    }

    let rest = &line[4..];
    if !rest.starts_with(char::is_whitespace) {
        return None;
    }

    let pattern = rest.trim();
    (!pattern.is_empty()).then_some(pattern)
}

fn is_wildcard(pattern: &str) -> bool {
    pattern.contains('*') || pattern.contains('?')
}

/// Splits `key=value` or `key value` (space, then tab) into a lower-cased key and trimmed value.
fn split_key_value(line: &str) -> Option<(String, &str)> {
    let (key, value) = match line.split_once('=') {
        Some(pair) => pair,
        None => line.split_once(' ').or_else(|| line.split_once('\t'))?,
    };
    Some((key.trim().to_lowercase(), value.trim()))
}

/// Rewrites a leading `~/` to the home directory; any other value is returned unchanged.
pub fn expand_tilde(path: &str, home: Option<&Path>) -> String {
    match (path.strip_prefix("~/"), home) {
        (Some(rest), Some(home)) => home.join(rest).to_string_lossy().into_owned(),
        _ => path.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SAMPLE: &str = "# Production server
Host prod
    HostName prod.example.com
    User admin
    Port 2222
    IdentityFile ~/.ssh/prod_key

# Development server
Host dev
    HostName dev.example.com
    User developer

Host staging
    HostName staging.example.com
    Port 22

# Wildcard should be ignored
Host *
    ServerAliveInterval 60
    User root
";

    fn home() -> PathBuf {
        PathBuf::from("/home/tester")
    }

    fn parse(content: &str) -> Vec<HostRecord> {
        let home = home();
        parse_ssh_config_content(content, Some(&home))
    }

    #[test]
    fn test_parse_sample_config() {
        let hosts = parse(SAMPLE);

        assert_eq!(hosts.len(), 3);
        let names: Vec<&str> = hosts.iter().map(|h| h.name.as_str()).collect();
        assert_eq!(names, vec!["prod", "dev", "staging"]);

        let prod = &hosts[0];
        assert_eq!(prod.host_name.as_deref(), Some("prod.example.com"));
        assert_eq!(prod.user.as_deref(), Some("admin"));
        assert_eq!(prod.port, "2222");
        assert_eq!(prod.comment.as_deref(), Some("Production server"));
        assert_eq!(
            prod.identity_file,
            Some(PathBuf::from("/home/tester/.ssh/prod_key"))
        );

        let dev = &hosts[1];
        assert_eq!(dev.port, "22");
        assert_eq!(dev.comment.as_deref(), Some("Development server"));
        assert_eq!(dev.identity_file, None);

        let staging = &hosts[2];
        assert_eq!(staging.comment, None);
    }

    #[test]
    fn test_wildcard_attributes_never_leak() {
        let hosts = parse(SAMPLE);
        assert!(!hosts.iter().any(|h| h.name.contains('*')));
        assert!(!hosts.iter().any(|h| h.user.as_deref() == Some("root")));
    }

    #[test]
    fn test_question_mark_pattern_is_wildcard() {
        let hosts = parse("Host web?\n  User x\nHost web1\n");
        assert_eq!(hosts.len(), 1);
        assert_eq!(hosts[0].name, "web1");
        assert_eq!(hosts[0].user, None);
    }

    #[test]
    fn test_wildcard_in_middle_then_real_host() {
        let content = "Host a\n  User ua\nHost *.internal\n  User root\nHost b\n  User ub\n";
        let hosts = parse(content);
        assert_eq!(hosts.len(), 2);
        assert_eq!(hosts[0].user.as_deref(), Some("ua"));
        assert_eq!(hosts[1].user.as_deref(), Some("ub"));
    }

    #[test]
    fn test_default_port() {
        let hosts = parse("Host box\n  HostName box.lan\n");
        assert_eq!(hosts[0].port, DEFAULT_PORT);
    }

    #[test]
    fn test_equals_and_space_syntax_are_equivalent() {
        let spaced = parse(
            "Host a\n  HostName a.example.com\n  Port 2200\n  User me\n  IdentityFile ~/.ssh/k\n",
        );
        let equals = parse(
            "Host a\n  HostName=a.example.com\n  Port = 2200\n  User=me\n  IdentityFile= ~/.ssh/k\n",
        );
        assert_eq!(spaced, equals);
    }

    #[test]
    fn test_tab_separated_attribute() {
        let hosts = parse("Host a\n\tHostName\ta.example.com\n");
        assert_eq!(hosts[0].host_name.as_deref(), Some("a.example.com"));
    }

    #[test]
    fn test_keys_are_case_insensitive() {
        let hosts = parse("host a\n  HOSTNAME a.example.com\n  uSeR me\n");
        assert_eq!(hosts.len(), 1);
        assert_eq!(hosts[0].host_name.as_deref(), Some("a.example.com"));
        assert_eq!(hosts[0].user.as_deref(), Some("me"));
    }

    #[test]
    fn test_unknown_keys_and_bare_words_ignored() {
        let hosts = parse("Host a\n  ForwardAgent yes\n  Compression\n  User me\n");
        assert_eq!(hosts.len(), 1);
        assert_eq!(hosts[0].user.as_deref(), Some("me"));
    }

    #[test]
    fn test_attributes_before_any_host_are_ignored() {
        let hosts = parse("User nobody\nPort 1\nHost a\n");
        assert_eq!(hosts.len(), 1);
        assert_eq!(hosts[0].user, None);
        assert_eq!(hosts[0].port, "22");
    }

    #[test]
    fn test_hostname_keyword_is_not_a_host_line() {
        let hosts = parse("Host a\nHostName a.example.com\n");
        assert_eq!(hosts.len(), 1);
        assert_eq!(hosts[0].host_name.as_deref(), Some("a.example.com"));
    }

    #[test]
    fn test_comment_survives_blank_lines() {
        let hosts = parse("# kept\n\n\nHost a\n");
        assert_eq!(hosts[0].comment.as_deref(), Some("kept"));
    }

    #[test]
    fn test_overwritten_comment_is_discarded() {
        let hosts = parse("# first\n# second\nHost a\nHost b\n");
        assert_eq!(hosts[0].comment.as_deref(), Some("second"));
        assert_eq!(hosts[1].comment, None);
    }

    #[test]
    fn test_comment_before_wildcard_is_dropped() {
        let hosts = parse("# defaults\nHost *\n  User root\nHost a\n");
        assert_eq!(hosts.len(), 1);
        assert_eq!(hosts[0].comment, None);
    }

    #[test]
    fn test_comment_inside_block_attaches_to_next_host() {
        let hosts = parse("Host a\n  User ua\n# next one\nHost b\n");
        assert_eq!(hosts[0].comment, None);
        assert_eq!(hosts[1].comment.as_deref(), Some("next one"));
    }

    #[test]
    fn test_empty_config_is_empty_not_error() {
        assert!(parse("").is_empty());
        assert!(parse("# only comments\n\n").is_empty());
    }

    #[test]
    fn test_parse_ssh_config_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();

        let hosts = parse_ssh_config(file.path()).unwrap();
        assert_eq!(hosts.len(), 3);
    }

    #[test]
    fn test_parse_ssh_config_empty_file() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let hosts = parse_ssh_config(file.path()).unwrap();
        assert!(hosts.is_empty());
    }

    #[test]
    fn test_parse_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = parse_ssh_config(&dir.path().join("does-not-exist"));
        assert!(matches!(result, Err(Error::ConfigIo { .. })));
    }

    #[test]
    fn test_expand_tilde() {
        let home = home();
        assert_eq!(
            expand_tilde("~/.ssh/id_rsa", Some(&home)),
            home.join(".ssh/id_rsa").to_string_lossy()
        );
        assert_eq!(expand_tilde("/etc/ssh/config", Some(&home)), "/etc/ssh/config");
        assert_eq!(expand_tilde("config/test", Some(&home)), "config/test");
        assert_eq!(expand_tilde("/path/~/file", Some(&home)), "/path/~/file");
        assert_eq!(expand_tilde("~", Some(&home)), "~");
        assert_eq!(expand_tilde("~/.ssh/id_rsa", None), "~/.ssh/id_rsa");
    }

    #[test]
    fn test_display_full_host() {
        let host = HostRecord {
            name: "production".to_string(),
            host_name: Some("prod.example.com".to_string()),
            port: "2222".to_string(),
            user: Some("admin".to_string()),
            comment: Some("Production server".to_string()),
            identity_file: None,
        };
        let display = host.display();
        for part in ["production", "prod.example.com", "admin", "port=2222", "(Production server)"] {
            assert!(display.contains(part), "{display:?} should contain {part:?}");
        }
    }

    #[test]
    fn test_display_omits_default_port() {
        let mut host = HostRecord::new("server");
        host.host_name = Some("server.example.com".to_string());
        let display = host.display();
        assert!(display.contains("server.example.com"));
        assert!(!display.contains("port="));

        host.port = "2200".to_string();
        assert!(host.display().contains("port=2200"));
    }

    #[test]
    fn test_display_minimal_is_padded_name() {
        let host = HostRecord::new("test-server");
        assert_eq!(host.display(), format!("{:<20}", "test-server"));
    }

    #[test]
    fn test_preview_lists_all_fields() {
        let mut host = HostRecord::new("db");
        host.identity_file = Some(PathBuf::from("/keys/db"));
        let preview = host.preview();
        let lines: Vec<&str> = preview.lines().collect();
        assert_eq!(lines.len(), 6);
        assert_eq!(lines[0], "Name:     db");
        assert_eq!(lines[3], "Port:     22");
        assert_eq!(lines[4], "Key:      /keys/db");
    }

    #[test]
    fn test_address_falls_back_to_name() {
        let mut host = HostRecord::new("alias");
        assert_eq!(host.address(), "alias");
        host.host_name = Some("10.0.0.5".to_string());
        assert_eq!(host.address(), "10.0.0.5");
    }
}
