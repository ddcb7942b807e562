// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! JSON-over-TCP control listener for dab-server.
//!
//! Accepts client connections speaking the `ClientEnvelope`/`ClientResponse`
//! protocol defined in `dab-protocol`.

use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tracing::{debug, error, info};

use dab_core::{
    AnnouncementFlags, ChannelId, EngineHandle, FailureReason, ServiceAnnouncementSupport,
};
use dab_history::{ExportError, HistoryLedger};
use dab_protocol::{
    encode_response, parse_envelope, signal_from_parts, ClientCommand, ClientResponse,
    SimpleTokenValidator, TokenValidator,
};

/// Everything a client command can reach.
#[derive(Clone)]
pub struct ControlContext {
    pub engine: EngineHandle,
    pub ledger: Arc<HistoryLedger>,
}

/// Run the JSON TCP listener until `shutdown_rx` flips to true.
pub async fn run_listener(
    addr: SocketAddr,
    ctx: ControlContext,
    auth_tokens: HashSet<String>,
    mut shutdown_rx: watch::Receiver<bool>,
) -> std::io::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!("Listening on {}", addr);

    let validator = Arc::new(SimpleTokenValidator::new(auth_tokens));

    loop {
        tokio::select! {
            accepted = listener.accept() => {
                let (socket, peer) = accepted?;
                info!("Client connected: {}", peer);

                let ctx = ctx.clone();
                let validator = Arc::clone(&validator);
                tokio::spawn(async move {
                    if let Err(e) = handle_client(socket, peer, ctx, validator).await {
                        error!("Client {} error: {:?}", peer, e);
                    }
                });
            }
            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    info!("Listener on {} shutting down", addr);
                    return Ok(());
                }
            }
        }
    }
}

async fn handle_client(
    socket: TcpStream,
    addr: SocketAddr,
    ctx: ControlContext,
    validator: Arc<SimpleTokenValidator>,
) -> std::io::Result<()> {
    let (reader, mut writer) = socket.into_split();
    let mut reader = BufReader::new(reader);
    let mut line = String::new();

    loop {
        line.clear();
        let bytes_read = reader.read_line(&mut line).await?;
        if bytes_read == 0 {
            info!("Client {} disconnected", addr);
            break;
        }

        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let resp = match parse_envelope(trimmed) {
            Ok(envelope) => match validator.validate(envelope.token.as_deref()) {
                Ok(()) => execute(&ctx, envelope.cmd).await,
                Err(err) => ClientResponse::error(err.to_string()),
            },
            Err(e) => {
                error!("Invalid JSON from {}: {} / {:?}", addr, trimmed, e);
                ClientResponse::error(format!("Invalid JSON: {}", e))
            }
        };

        let resp_line = encode_response(&resp)?;
        writer.write_all(resp_line.as_bytes()).await?;
        writer.flush().await?;
    }

    Ok(())
}

/// Apply one client command and build its response.
pub async fn execute(ctx: &ControlContext, cmd: ClientCommand) -> ClientResponse {
    debug!("Control command: {:?}", cmd);
    let result = match cmd {
        // Served from the watch channel; never waits on the engine.
        ClientCommand::GetState => Ok(ctx.engine.status()),
        ClientCommand::Signal {
            announcement_type,
            cluster,
            target,
            priority,
            kind,
        } => {
            let signal = signal_from_parts(announcement_type, cluster, &target, priority, kind);
            ctx.engine.on_announcement_signal(signal).await
        }
        ClientCommand::ManualReturn => ctx.engine.request_manual_return().await,
        ClientCommand::SetService { service } => {
            ctx.engine
                .set_service(service.filter(|s| !s.is_empty()).map(ChannelId::new))
                .await
        }
        ClientCommand::SetConfig { config } => ctx.engine.on_configuration_changed(config).await,
        ClientCommand::UpdateSupport {
            service,
            flags,
            clusters,
        } => {
            let support =
                ServiceAnnouncementSupport::new(service, AnnouncementFlags(flags), clusters);
            ctx.engine.update_service_support(support).await
        }
        ClientCommand::ClearSupport { service } => {
            ctx.engine
                .clear_service_support(ChannelId::new(service))
                .await
        }
        ClientCommand::ClearAll => ctx.engine.clear_all().await,
        ClientCommand::RetuneResult { success, reason } => {
            let result = if success {
                Ok(())
            } else {
                Err(reason.unwrap_or(FailureReason::TunerFault))
            };
            ctx.engine.retune_result(result).await
        }
        ClientCommand::QueryHistory { filter, limit } => {
            let mut entries = ctx.ledger.query(filter).to_vec();
            if let Some(limit) = limit {
                let skip = entries.len().saturating_sub(limit);
                entries.drain(..skip);
            }
            return ClientResponse {
                history: Some(entries),
                ..ClientResponse::ok()
            };
        }
        ClientCommand::HistoryStats { window } => {
            let stats = ctx.ledger.statistics(window, chrono::Utc::now());
            return ClientResponse {
                stats: Some(stats),
                ..ClientResponse::ok()
            };
        }
        ClientCommand::ExportHistory { filter } => {
            return match ctx.ledger.export_csv(filter) {
                Ok(bytes) => ClientResponse {
                    csv: Some(String::from_utf8_lossy(&bytes).into_owned()),
                    ..ClientResponse::ok()
                },
                Err(ExportError::NoData) => {
                    ClientResponse::error("No history entries match the filter")
                }
                Err(e) => ClientResponse::error(e.to_string()),
            };
        }
        ClientCommand::ClearHistory => {
            return match ctx.ledger.clear() {
                Ok(()) => ClientResponse::ok(),
                Err(e) => ClientResponse::error(e.to_string()),
            };
        }
    };

    match result {
        Ok(status) => ClientResponse::with_state(status),
        Err(e) => ClientResponse::error(e.to_string()),
    }
}
