use std::{env, path::PathBuf};

use anyhow::{Result, bail};
use clap::{ArgAction, Parser};
use client_core::{ConnectorOptions, HostKeyPolicy, default_config_path, default_known_hosts_path};
use fwd_types::{DynamicSocksForward, LocalTcpForward};
use secrecy::SecretString;
use ssh_core::forwarding::{parse_dynamic_socks, parse_local_tcp};

pub const PASSWORD_ENV: &str = "FWD_PASSWORD";

#[derive(Debug, Parser)]
#[command(name = "fwd", about = "Run SSH local forwards and SOCKS5 proxies through a host alias")]
pub struct FwdArgs {
    /// Host alias from the ssh config file
    #[arg(value_name = "ALIAS")]
    alias: String,
    /// Local TCP forward (repeatable)
    #[arg(
        short = 'L',
        long = "local",
        value_name = "[BIND:]PORT:HOST:HOSTPORT",
        action = ArgAction::Append,
        value_parser = parse_local_arg,
        help_heading = "Forwarding"
    )]
    local: Vec<LocalTcpForward>,
    /// Dynamic SOCKS5 proxy (repeatable)
    #[arg(
        short = 'D',
        long = "dynamic",
        value_name = "[BIND:]PORT",
        action = ArgAction::Append,
        value_parser = parse_dynamic_arg,
        help_heading = "Forwarding"
    )]
    dynamic: Vec<DynamicSocksForward>,
    /// Listen on all interfaces instead of loopback
    #[arg(short = 'g', long = "gateway-ports", action = ArgAction::SetTrue, help_heading = "Forwarding")]
    gateway: bool,
    /// ssh config file to read host profiles from (default ~/.ssh/config)
    #[arg(long = "ssh-config", value_name = "PATH")]
    ssh_config: Option<PathBuf>,
    /// Known host keys file
    #[arg(long = "known-hosts", value_name = "PATH")]
    known_hosts: Option<PathBuf>,
    /// Trust and record host keys that are not known yet
    #[arg(long = "accept-new-hostkey", action = ArgAction::SetTrue)]
    accept_new_hostkey: bool,
    /// Read the password or key passphrase from the first line of stdin
    #[arg(long = "password-stdin", action = ArgAction::SetTrue, conflicts_with = "prompt_password", help_heading = "Auth Options")]
    password_stdin: bool,
    /// Prompt for the password or key passphrase before connecting
    #[arg(short = 'p', long = "password-prompt", action = ArgAction::SetTrue, help_heading = "Auth Options")]
    prompt_password: bool,
    /// More log output (repeatable)
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count)]
    verbose: u8,
    /// Less log output (repeatable)
    #[arg(short = 'q', long = "quiet", action = ArgAction::Count, conflicts_with = "verbose")]
    quiet: u8,
}

impl FwdArgs {
    /// Net log verbosity for `init_tracing`.
    pub fn verbosity(&self) -> i8 {
        let up = i8::try_from(self.verbose).unwrap_or(i8::MAX);
        let down = i8::try_from(self.quiet).unwrap_or(i8::MAX);
        up.saturating_sub(down)
    }
}

/// Where the password (or key passphrase) comes from.
#[derive(Debug)]
pub enum PasswordSource {
    /// Only ask if the server setup turns out to need one.
    OnDemand,
    Provided(SecretString),
    Stdin,
    Prompt,
}

/// One tunnel the user asked for.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ForwardRequest {
    Local(LocalTcpForward),
    Dynamic(DynamicSocksForward),
}

#[derive(Debug)]
pub struct RunConfig {
    pub alias: String,
    pub forwards: Vec<ForwardRequest>,
    pub connector: ConnectorOptions,
    pub password: PasswordSource,
}

impl TryFrom<FwdArgs> for RunConfig {
    type Error = anyhow::Error;

    fn try_from(args: FwdArgs) -> Result<Self> {
        let FwdArgs {
            alias,
            local,
            dynamic,
            gateway,
            ssh_config,
            known_hosts,
            accept_new_hostkey,
            password_stdin,
            prompt_password,
            verbose: _,
            quiet: _,
        } = args;

        if local.is_empty() && dynamic.is_empty() {
            bail!("nothing to forward; pass at least one -L or -D");
        }
        let forwards = local
            .into_iter()
            .map(|mut forward| {
                forward.gateway |= gateway;
                ForwardRequest::Local(forward)
            })
            .chain(dynamic.into_iter().map(|mut forward| {
                forward.gateway |= gateway;
                ForwardRequest::Dynamic(forward)
            }))
            .collect();

        let hostkey_policy = if accept_new_hostkey {
            HostKeyPolicy::AcceptNew
        } else {
            HostKeyPolicy::Strict
        };
        let connector = ConnectorOptions {
            ssh_config: ssh_config.unwrap_or_else(default_config_path),
            known_hosts: known_hosts.unwrap_or_else(default_known_hosts_path),
            hostkey_policy,
        };

        Ok(RunConfig {
            alias,
            forwards,
            connector,
            password: resolve_password_source(password_stdin, prompt_password),
        })
    }
}

fn resolve_password_source(stdin: bool, prompt: bool) -> PasswordSource {
    if stdin {
        return PasswordSource::Stdin;
    }
    if prompt {
        return PasswordSource::Prompt;
    }
    match env::var(PASSWORD_ENV) {
        Ok(value) if !value.is_empty() => PasswordSource::Provided(SecretString::from(value)),
        _ => PasswordSource::OnDemand,
    }
}

fn parse_local_arg(value: &str) -> Result<LocalTcpForward, String> {
    parse_local_tcp(value).map_err(|err| err.to_string())
}

fn parse_dynamic_arg(value: &str) -> Result<DynamicSocksForward, String> {
    parse_dynamic_socks(value).map_err(|err| err.to_string())
}
