//! Unit tests for ssh_config parsing and alias resolution.

use super::*;

const SAMPLE: &str = r#"
# jump hosts
Host bastion
    HostName bastion.example.net
    User ops
    Port 2222
    IdentityFile ~/.ssh/id_bastion

Host db-* !db-legacy
    HostName %h.internal
    User=postgres

Host *
    User fallback
    IdentityFile "/etc/ssh/shared_key"
    ServerAliveInterval 15
"#;

fn sample() -> SshConfig {
    SshConfig::parse(SAMPLE, "config").unwrap()
}

#[test]
fn resolves_explicit_host_block() {
    let profile = sample().resolve("bastion").unwrap();
    assert_eq!(profile.host_name, "bastion.example.net");
    assert_eq!(profile.port, 2222);
    assert_eq!(profile.user, "ops");
    assert_eq!(
        profile.identity_files,
        vec![fallback_home().join(".ssh/id_bastion"), PathBuf::from("/etc/ssh/shared_key")]
    );
}

#[test]
fn glob_patterns_and_tokens() {
    let profile = sample().resolve("db-orders").unwrap();
    assert_eq!(profile.host_name, "db-orders.internal");
    assert_eq!(profile.user, "postgres");
    assert_eq!(profile.port, DEFAULT_SSH_PORT);
}

#[test]
fn negated_pattern_excludes_alias() {
    let err = sample().resolve("db-legacy").unwrap_err();
    assert!(matches!(err, ClientError::HostNotFound(alias) if alias == "db-legacy"));
}

#[test]
fn catch_all_alone_is_not_a_profile() {
    assert!(matches!(sample().resolve("elsewhere"), Err(ClientError::HostNotFound(_))));
}

#[test]
fn first_value_wins() {
    let config = SshConfig::parse("Host a\n  Port 1\n  Port 2\nHost a\n  Port 3\n", "config").unwrap();
    assert_eq!(config.resolve("a").unwrap().port, 1);
}

#[test]
fn rejects_bad_port_with_line_number() {
    let err = SshConfig::parse("Host a\n  Port nope\n", "cfg").unwrap_err();
    match err {
        ClientError::Config { path, line, .. } => {
            assert_eq!(path, "cfg");
            assert_eq!(line, 2);
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn glob_matching() {
    assert!(glob_match("web?", "web1"));
    assert!(!glob_match("web?", "web10"));
    assert!(glob_match("*.example.com", "api.example.com"));
    assert!(glob_match("a*b*c", "aXXbYYc"));
    assert!(!glob_match("a*b", "ac"));
}

#[tokio::test]
async fn missing_file_is_empty_config() {
    let dir = tempfile::tempdir().unwrap();
    let config = SshConfig::load(&dir.path().join("absent")).await.unwrap();
    assert!(matches!(config.resolve("bastion"), Err(ClientError::HostNotFound(_))));
}

#[tokio::test]
async fn loads_from_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config");
    std::fs::write(&path, SAMPLE).unwrap();
    let config = SshConfig::load(&path).await.unwrap();
    assert_eq!(config.resolve("bastion").unwrap().user, "ops");
}
