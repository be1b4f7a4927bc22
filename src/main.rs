use anyhow::Result;
use prepaid_meter_controller::{api, command, config, controller, hardware, telemetry};
use config::Config;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

fn main() -> Result<()> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    let result = runtime.block_on(run());
    // stdin is read on a blocking thread that never returns on its own
    runtime.shutdown_timeout(Duration::from_secs(1));
    result
}

async fn run() -> Result<()> {
    dotenvy::dotenv().ok();
    let cfg = Config::load()?;
    telemetry::init_tracing(&cfg.log);

    if cfg.auth.token.is_empty() || cfg.auth.token.starts_with("__SET_VIA_ENV") {
        anyhow::bail!(
            "PPM__AUTH__TOKEN must be set to a random token (min 32 chars). \
            Generate one with: openssl rand -base64 32"
        );
    }
    if cfg.auth.token == "devtoken" {
        warn!("Using 'devtoken' auth token - this is only safe for local development!");
    }

    let factory = hardware::DeviceFactory::new(cfg.clone());
    let ctx = factory.build_context().await?;

    let control = controller::spawn_controller_tasks(ctx.clone());

    let dispatcher = command::CommandDispatcher::new(ctx.clone());
    let serial = tokio::spawn(command::serve_frames(
        tokio::io::stdin(),
        tokio::io::stdout(),
        dispatcher,
        ctx.shutdown.clone(),
    ));

    let addr = cfg.server.socket_addr()?;
    if cfg.server.host == "0.0.0.0" {
        warn!("Server binding to 0.0.0.0 - the command API is reachable from the network");
    }
    info!(%addr, mode = %factory.mode(), "starting prepaid meter");

    let app = api::router(api::ApiState::new(ctx.clone(), &cfg.auth.token), &cfg);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(stop_requested(ctx.clone()))
        .await?;

    if let Err(e) = control.await {
        warn!(error = %e, "control loop task ended abnormally");
    }
    serial.abort();
    warn!("shutdown complete");
    Ok(())
}

/// Resolves on a signal or the reboot command, with the ledger locked.
async fn stop_requested(ctx: Arc<controller::MeterContext>) {
    tokio::select! {
        _ = telemetry::shutdown_signal() => ctx.begin_shutdown().await,
        _ = ctx.shutdown.cancelled() => {}
    }
}
