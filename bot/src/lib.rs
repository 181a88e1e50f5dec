//! arrwatch bot: wires settings into the core monitor, talks to Discord over REST, and turns
//! process signals into shutdown (Ctrl-C / SIGTERM) and channel resync (SIGHUP).

use std::sync::Arc;

use anyhow::Context;
use arrwatch::backends::{ArrHttp, HttpSettings};
use arrwatch::chat::{ChatGateway, ChatTransport, DiscordTransport};
use arrwatch::config::Settings;
use arrwatch::monitor::{Monitor, ResyncHandle};
use arrwatch::poller::Poller;
use arrwatch::reconcile::Reconciler;
use tokio_util::sync::CancellationToken;

/// Run until shutdown, or for a single tick when `once` is set.
pub async fn run_bot(settings: Settings, once: bool) -> anyhow::Result<()> {
    let registry = settings.registry().context("invalid instance list")?;
    let http = ArrHttp::new(&HttpSettings {
        request_timeout: settings.request_timeout,
        ..HttpSettings::default()
    })
    .context("failed to build HTTP client")?;
    let poller = Poller::from_registry(&registry, http, settings.request_timeout);

    let transport = Arc::new(DiscordTransport::new(&settings.discord_token, settings.channel_id));
    let bot_user = transport.whoami().await.context("Discord rejected the bot token")?;
    tracing::info!(bot = %bot_user, channel = %transport.target(), "connected to Discord");

    let gateway = ChatGateway::new(transport, settings.retry.clone());
    let mut monitor = Monitor::new(
        registry,
        poller,
        Reconciler::new(gateway),
        settings.grouping,
        settings.poll_interval,
    );

    if once {
        let summary = monitor.run_tick().await?;
        tracing::info!(
            slots = summary.slots,
            failed = summary.failed_instances,
            chat_failures = summary.report.failed,
            "single tick done"
        );
        return Ok(());
    }

    let cancel = CancellationToken::new();
    spawn_shutdown_listener(cancel.clone());
    spawn_resync_listener(monitor.resync_handle());
    monitor.run(cancel).await;
    Ok(())
}

fn spawn_shutdown_listener(cancel: CancellationToken) {
    tokio::spawn(async move {
        wait_for_shutdown().await;
        tracing::info!("shutdown requested; letting the current tick finish");
        cancel.cancel();
    });
}

#[cfg(unix)]
async fn wait_for_shutdown() {
    use tokio::signal::unix::{signal, SignalKind};
    match signal(SignalKind::terminate()) {
        Ok(mut term) => {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = term.recv() => {}
            }
        }
        Err(e) => {
            tracing::warn!(error = %e, "SIGTERM handler unavailable; Ctrl-C only");
            let _ = tokio::signal::ctrl_c().await;
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown() {
    let _ = tokio::signal::ctrl_c().await;
}

#[cfg(unix)]
fn spawn_resync_listener(handle: ResyncHandle) {
    use tokio::signal::unix::{signal, SignalKind};
    tokio::spawn(async move {
        let mut hangup = match signal(SignalKind::hangup()) {
            Ok(s) => s,
            Err(e) => {
                tracing::warn!(error = %e, "SIGHUP handler unavailable; resync only on restart");
                return;
            }
        };
        while hangup.recv().await.is_some() {
            tracing::info!("SIGHUP: channel will be purged and reposted on the next tick");
            handle.request();
        }
    });
}

#[cfg(not(unix))]
fn spawn_resync_listener(_handle: ResyncHandle) {}
