use fwd_types::{DynamicSocksForward, LocalTcpForward};

use crate::SshCoreError;

/// Parse a local TCP forward specification.
///
/// Format: `[bind_address:]port:host:hostport`
pub fn parse_local_tcp(spec: &str) -> crate::SshResult<LocalTcpForward> {
    let fields = split_colon_parts(spec);
    let (gateway, rest) = match fields.len() {
        4 => (parse_bind("local TCP", &fields[0])?, &fields[1..]),
        3 => (false, &fields[..]),
        _ => {
            return Err(SshCoreError::invalid_forward(
                "local TCP",
                "spec must be [bind_address:]port:host:hostport",
            ));
        }
    };
    let target_host = normalize_host(&rest[1])
        .ok_or_else(|| SshCoreError::invalid_forward("local TCP", "target host must not be empty"))?;
    Ok(LocalTcpForward {
        gateway,
        bind_port: parse_port(&rest[0])?,
        target_host,
        target_port: parse_port(&rest[2])?,
    })
}

/// Parse a dynamic SOCKS forward specification.
///
/// Format: `[bind_address:]port`
pub fn parse_dynamic_socks(spec: &str) -> crate::SshResult<DynamicSocksForward> {
    let fields = split_colon_parts(spec);
    let (gateway, port) = match fields.as_slice() {
        [port] => (false, port),
        [bind, port] => (parse_bind("dynamic SOCKS", bind)?, port),
        _ => {
            return Err(SshCoreError::invalid_forward(
                "dynamic SOCKS",
                "spec must be [bind_address:]port",
            ));
        }
    };
    Ok(DynamicSocksForward {
        gateway,
        bind_port: parse_port(port)?,
    })
}

/// Map a bind address onto the two supported listen modes.
fn parse_bind(kind: &str, value: &str) -> crate::SshResult<bool> {
    match normalize_host(value).as_deref() {
        None | Some("*") | Some("0.0.0.0") => Ok(true),
        Some("localhost") | Some("127.0.0.1") => Ok(false),
        // Listeners only bind IPv4.
        Some(other @ ("::" | "::1")) => Err(SshCoreError::invalid_forward(
            kind,
            format!("IPv6 bind address {other} is not supported; use localhost or *"),
        )),
        Some(other) => Err(SshCoreError::invalid_forward(
            kind,
            format!("bind address {other} is not supported; use localhost or *"),
        )),
    }
}

fn parse_port(value: &str) -> crate::SshResult<u16> {
    value
        .trim()
        .parse::<u16>()
        .map_err(|_| SshCoreError::InvalidPort(value.to_string()))
}

fn normalize_host(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }
    let no_brackets = trimmed
        .strip_prefix('[')
        .and_then(|rest| rest.strip_suffix(']'))
        .map(|inner| inner.to_string());
    no_brackets.or_else(|| Some(trimmed.to_string()))
}

/// Split on colons outside of `[...]`, keeping empty fields.
fn split_colon_parts(input: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut bracket_depth = 0;
    for ch in input.trim().chars() {
        match ch {
            ':' if bracket_depth == 0 => {
                parts.push(current.trim().to_string());
                current.clear();
            }
            '[' => {
                bracket_depth += 1;
                current.push(ch);
            }
            ']' => {
                if bracket_depth > 0 {
                    bracket_depth -= 1;
                }
                current.push(ch);
            }
            _ => current.push(ch),
        }
    }
    parts.push(current.trim().to_string());
    parts
}

#[cfg(test)]
#[path = "parsing_tests.rs"]
mod tests;
