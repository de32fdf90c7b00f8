use std::io::{self, BufRead};

use anyhow::{Context, Result, anyhow};
use client_core::SshConnector;
use fwd_types::{TunnelId, TunnelInfo};
use secrecy::SecretString;
use ssh_core::{
    SshCoreError,
    forwarding::{SessionConnector, TunnelManager},
};
use tokio::{sync::broadcast::error::RecvError, task};
use tracing::{info, warn};

use crate::cli::{ForwardRequest, PasswordSource, RunConfig};

pub async fn run(config: RunConfig) -> Result<()> {
    let RunConfig {
        alias,
        forwards,
        connector,
        password,
    } = config;
    let connector = SshConnector::new(connector)
        .await
        .context("failed to load client configuration")?;
    let manager = TunnelManager::new(connector);

    let mut credential = read_initial_credential(&alias, password).await?;
    if let Err(err) = start_forwards(&manager, &alias, &forwards, &mut credential).await {
        manager.stop_all().await;
        return Err(err);
    }
    supervise(&manager).await;
    Ok(())
}

/// Start every requested tunnel, asking for a password once if setup needs one.
pub async fn start_forwards<C>(
    manager: &TunnelManager<C>,
    alias: &str,
    forwards: &[ForwardRequest],
    credential: &mut Option<SecretString>,
) -> Result<Vec<TunnelId>>
where
    C: SessionConnector,
{
    let mut started = Vec::with_capacity(forwards.len());
    for request in forwards {
        let id = match start_one(manager, alias, request, credential.as_ref()).await {
            Err(SshCoreError::PasswordRequired(_)) if credential.is_none() => {
                *credential = Some(prompt_password(alias).await?);
                start_one(manager, alias, request, credential.as_ref()).await
            }
            other => other,
        }
        .with_context(|| format!("failed to start {}", describe(request)))?;
        started.push(id);
    }
    Ok(started)
}

async fn start_one<C>(
    manager: &TunnelManager<C>,
    alias: &str,
    request: &ForwardRequest,
    credential: Option<&SecretString>,
) -> ssh_core::SshResult<TunnelId>
where
    C: SessionConnector,
{
    match request {
        ForwardRequest::Local(forward) => {
            manager
                .start_local_forward(
                    alias,
                    forward.bind_port,
                    &forward.target_host,
                    forward.target_port,
                    credential,
                    forward.gateway,
                )
                .await
        }
        ForwardRequest::Dynamic(forward) => {
            manager
                .start_dynamic_forward(alias, forward.bind_port, credential, forward.gateway)
                .await
        }
    }
}

/// Print the tunnel table on every change until no tunnel is left.
///
/// Ctrl-C stops every tunnel; a second Ctrl-C exits without waiting.
async fn supervise<C>(manager: &TunnelManager<C>)
where
    C: SessionConnector,
{
    let mut events = manager.subscribe();
    let mut stopping = false;
    if !print_tunnels(manager).await {
        return;
    }
    loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                if let Err(err) = signal {
                    warn!(?err, "failed to listen for ctrl-c");
                    return;
                }
                if stopping {
                    warn!("second interrupt; exiting without waiting for cleanup");
                    return;
                }
                info!("interrupt received; stopping tunnels");
                stopping = true;
                manager.stop_all().await;
            }
            event = events.recv() => match event {
                Ok(_) | Err(RecvError::Lagged(_)) => {
                    if !print_tunnels(manager).await {
                        return;
                    }
                }
                Err(RecvError::Closed) => return,
            }
        }
    }
}

/// Returns `false` once the registry is empty.
async fn print_tunnels<C>(manager: &TunnelManager<C>) -> bool
where
    C: SessionConnector,
{
    let tunnels = manager.active_tunnels().await;
    if tunnels.is_empty() {
        println!("no active tunnels");
        return false;
    }
    print!("{}", render_table(&tunnels));
    true
}

/// Format tunnels as an aligned text table, ordered by local address.
pub fn render_table(tunnels: &[TunnelInfo]) -> String {
    let mut rows: Vec<[String; 5]> = tunnels
        .iter()
        .map(|tunnel| {
            [
                tunnel.id.to_string(),
                tunnel.kind.to_string(),
                tunnel.alias.clone(),
                tunnel.local_addr.to_string(),
                tunnel.remote_addr.clone(),
            ]
        })
        .collect();
    rows.sort_by(|a, b| a[3].cmp(&b[3]));

    let header = ["ID", "KIND", "ALIAS", "LOCAL", "REMOTE"].map(String::from);
    let mut widths = header.clone().map(|cell| cell.len());
    for row in &rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.len());
        }
    }
    let mut out = String::new();
    for row in std::iter::once(&header).chain(rows.iter()) {
        let line = row
            .iter()
            .zip(widths)
            .map(|(cell, width)| format!("{cell:<width$}"))
            .collect::<Vec<_>>()
            .join("  ");
        out.push_str(line.trim_end());
        out.push('\n');
    }
    out
}

fn describe(request: &ForwardRequest) -> String {
    match request {
        ForwardRequest::Local(forward) => {
            format!("-L {}:{}:{}", forward.bind_port, forward.target_host, forward.target_port)
        }
        ForwardRequest::Dynamic(forward) => format!("-D {}", forward.bind_port),
    }
}

async fn read_initial_credential(alias: &str, source: PasswordSource) -> Result<Option<SecretString>> {
    match source {
        PasswordSource::OnDemand => Ok(None),
        PasswordSource::Provided(secret) => Ok(Some(secret)),
        PasswordSource::Prompt => prompt_password(alias).await.map(Some),
        PasswordSource::Stdin => {
            let line = task::spawn_blocking(|| -> io::Result<String> {
                let mut line = String::new();
                io::stdin().lock().read_line(&mut line)?;
                Ok(line)
            })
            .await
            .map_err(|e| anyhow!("task join error: {e}"))?
            .context("failed to read password from stdin")?;
            Ok(Some(SecretString::from(line.trim_end_matches(['\r', '\n']).to_string())))
        }
    }
}

async fn prompt_password(alias: &str) -> Result<SecretString> {
    let prompt = format!("{alias} password: ");
    task::spawn_blocking(move || rpassword::prompt_password(prompt).map(SecretString::from))
        .await
        .map_err(|e| anyhow!("task join error: {e}"))?
        .context("failed to read password")
}
