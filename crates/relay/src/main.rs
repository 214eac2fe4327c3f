use std::{net::SocketAddr, sync::Arc, time::Duration};

use anyhow::Context;
use relay_core::{
    config::Config,
    context::{AppContext, Ports},
    monitor::{ColorCodeRenderer, FileStateStore},
};
use relay_discord::DiscordClient;
use relay_earthmc::EarthMcClient;
use relay_http::AppState;
use tracing::{error, info, warn};

const IDENTIFY_RETRY: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    relay_core::logging::init("relay")?;
    info!("starting discord message relay");

    let cfg = Config::load()?;
    cfg.require_bot_token()?;
    info!(
        groups = cfg.relay_groups.group_count(),
        monitor = cfg.earthmc.enabled,
        "configuration ready"
    );

    let discord = Arc::new(DiscordClient::new(cfg.bot_token.clone())?);
    let earthmc = EarthMcClient::new()?;
    let addr = SocketAddr::from(([0, 0, 0, 0], cfg.port));

    let ctx = Arc::new(AppContext::new(
        cfg.clone(),
        Ports {
            webhooks: discord.clone(),
            entities: Arc::new(earthmc),
            state: Arc::new(FileStateStore::new(cfg.earthmc.state_file.clone())),
            renderer: Arc::new(ColorCodeRenderer),
        },
    ));

    let readiness = tokio::spawn(become_ready(ctx.clone(), discord));

    let served = relay_http::serve(AppState::new(ctx.clone()), addr, shutdown_signal())
        .await
        .context("relay http server");

    readiness.abort();
    ctx.shutdown().await;
    info!("relay stopped");
    served
}

/// Identify the bot (retrying until the token works), then open for traffic.
async fn become_ready(ctx: Arc<AppContext>, discord: Arc<DiscordClient>) {
    loop {
        match discord.current_user().await {
            Ok(user) => {
                ctx.mark_ready(user.display_name());
                ctx.start_monitor_if_enabled().await;
                return;
            }
            Err(e) => {
                warn!(error = %e, "discord identify failed, retrying");
                tokio::time::sleep(IDENTIFY_RETRY).await;
            }
        }
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "cannot listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    info!("shutdown requested");
}
