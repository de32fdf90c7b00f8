//! Host profiles read from an OpenSSH client configuration file.
//!
//! Only the keywords needed to open a forwarding session are understood:
//! `Host`, `HostName`, `Port`, `User`, and `IdentityFile`. Everything else is
//! skipped. As with OpenSSH, the first value obtained for a keyword wins, while
//! `IdentityFile` accumulates across matching blocks.

use std::path::{Path, PathBuf};

use tokio::fs;
use tracing::debug;

use crate::ClientError;

type Result<T> = crate::ClientResult<T>;

pub const DEFAULT_SSH_PORT: u16 = 22;

/// Connection parameters resolved for one alias.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HostProfile {
    pub alias: String,
    pub host_name: String,
    pub port: u16,
    pub user: String,
    pub identity_files: Vec<PathBuf>,
}

#[derive(Clone, Debug, Default)]
struct HostBlock {
    patterns: Vec<String>,
    host_name: Option<String>,
    port: Option<u16>,
    user: Option<String>,
    identity_files: Vec<String>,
}

impl HostBlock {
    fn global() -> Self {
        Self {
            patterns: vec!["*".to_string()],
            ..Default::default()
        }
    }

    /// `Some(true)` when a pattern other than a bare `*` matched.
    fn matches(&self, alias: &str) -> Option<bool> {
        let mut specific = false;
        let mut matched = false;
        for pattern in &self.patterns {
            if let Some(negated) = pattern.strip_prefix('!') {
                if glob_match(negated, alias) {
                    return None;
                }
            } else if glob_match(pattern, alias) {
                matched = true;
                specific |= pattern != "*";
            }
        }
        matched.then_some(specific)
    }
}

/// Parsed client configuration.
#[derive(Clone, Debug, Default)]
pub struct SshConfig {
    blocks: Vec<HostBlock>,
}

impl SshConfig {
    /// Load a config file. A missing file yields an empty configuration.
    pub async fn load(path: &Path) -> Result<Self> {
        match fs::read_to_string(path).await {
            Ok(contents) => Self::parse(&contents, &path.display().to_string()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "ssh config not found; no host profiles loaded");
                Ok(Self::default())
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Parse config text; `origin` is only used in error messages.
    pub fn parse(contents: &str, origin: &str) -> Result<Self> {
        let mut blocks = vec![HostBlock::global()];
        for (index, raw) in contents.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let config_error = |message: String| ClientError::Config {
                path: origin.to_string(),
                line: index + 1,
                message,
            };
            let (keyword, value) = split_keyword(line).ok_or_else(|| config_error(format!("missing value in `{line}`")))?;
            let keyword = keyword.to_ascii_lowercase();
            if keyword == "host" {
                let patterns: Vec<String> = value.split_whitespace().map(|p| unquote(p).to_string()).collect();
                blocks.push(HostBlock {
                    patterns,
                    ..Default::default()
                });
                continue;
            }
            let Some(block) = blocks.last_mut() else {
                continue;
            };
            let value = unquote(value);
            match keyword.as_str() {
                "hostname" => {
                    block.host_name.get_or_insert_with(|| value.to_string());
                }
                "port" => {
                    let port = value
                        .parse::<u16>()
                        .map_err(|_| config_error(format!("invalid port {value}")))?;
                    block.port.get_or_insert(port);
                }
                "user" => {
                    block.user.get_or_insert_with(|| value.to_string());
                }
                "identityfile" => block.identity_files.push(value.to_string()),
                other => debug!(keyword = other, "ignoring unsupported ssh config keyword"),
            }
        }
        Ok(Self { blocks })
    }

    /// Resolve `alias` into a profile.
    ///
    /// Fails with `HostNotFound` unless some `Host` pattern other than a bare
    /// `*` matches the alias.
    pub fn resolve(&self, alias: &str) -> Result<HostProfile> {
        let mut found = false;
        let mut host_name = None;
        let mut port = None;
        let mut user = None;
        let mut identity_files = Vec::new();
        for block in &self.blocks {
            let Some(specific) = block.matches(alias) else {
                continue;
            };
            found |= specific;
            host_name = host_name.or_else(|| block.host_name.clone());
            port = port.or(block.port);
            user = user.or_else(|| block.user.clone());
            identity_files.extend(block.identity_files.iter().map(|file| expand_tilde(file)));
        }
        if !found {
            return Err(ClientError::HostNotFound(alias.to_string()));
        }
        Ok(HostProfile {
            alias: alias.to_string(),
            host_name: host_name.map(|name| name.replace("%h", alias)).unwrap_or_else(|| alias.to_string()),
            port: port.unwrap_or(DEFAULT_SSH_PORT),
            user: user.unwrap_or_else(whoami::username),
            identity_files,
        })
    }
}

fn split_keyword(line: &str) -> Option<(&str, &str)> {
    let end = line.find(|c: char| c.is_whitespace() || c == '=')?;
    let (keyword, rest) = line.split_at(end);
    let rest = rest.trim_start();
    let rest = rest.strip_prefix('=').unwrap_or(rest).trim();
    (!rest.is_empty()).then_some((keyword, rest))
}

fn unquote(value: &str) -> &str {
    value
        .strip_prefix('"')
        .and_then(|inner| inner.strip_suffix('"'))
        .unwrap_or(value)
}

pub(crate) fn expand_tilde(path: &str) -> PathBuf {
    match path.strip_prefix("~/") {
        Some(rest) => fallback_home().join(rest),
        None if path == "~" => fallback_home(),
        None => PathBuf::from(path),
    }
}

pub(crate) fn fallback_home() -> PathBuf {
    dirs::home_dir().unwrap_or_else(|| PathBuf::from("."))
}

/// Default client config location, `~/.ssh/config`.
pub fn default_config_path() -> PathBuf {
    fallback_home().join(".ssh").join("config")
}

/// OpenSSH-style glob: `*` matches any run of characters, `?` exactly one.
fn glob_match(pattern: &str, text: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let text: Vec<char> = text.chars().collect();
    let (mut p, mut t) = (0, 0);
    let mut backtrack: Option<(usize, usize)> = None;
    while t < text.len() {
        if p < pattern.len() && (pattern[p] == '?' || pattern[p].eq_ignore_ascii_case(&text[t])) {
            p += 1;
            t += 1;
        } else if p < pattern.len() && pattern[p] == '*' {
            backtrack = Some((p, t));
            p += 1;
        } else if let Some((star, matched)) = backtrack {
            p = star + 1;
            t = matched + 1;
            backtrack = Some((star, matched + 1));
        } else {
            return false;
        }
    }
    pattern[p..].iter().all(|c| *c == '*')
}

#[cfg(test)]
#[path = "profiles_tests.rs"]
mod tests;
