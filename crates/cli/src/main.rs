mod cli;
mod commands;

use anyhow::Result;
use clap::Parser;
use tracing::{info, warn};

use lookout_core::config::{load_dotenv, Config};
use lookout_scheduler::{cancel_pair, CancelToken};

use crate::cli::{CliArgs, Command};
use crate::commands::CommandContext;

#[tokio::main]
async fn main() -> Result<()> {
    load_dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let args = CliArgs::parse();

    let mut config = Config::for_profile(args.profile.as_deref().unwrap_or(""));
    if let Some(name) = args.schedule_name {
        config.schedule.schedule_name = Some(name);
    }
    if let Some(model) = args.model_name {
        config.schedule.model_name = Some(model);
    }
    if let Some(freq) = args.upload_frequency {
        config.schedule.upload_frequency = Some(freq);
    }
    config.log_summary();

    let ctx = CommandContext {
        config,
        cancel: cancel_on_signal(),
        storage_root: args.storage_root,
    };

    match args.command {
        Command::ResolveKey { component, fire_time } => commands::resolve_key(&ctx, &component, fire_time),
        Command::NextFire { after } => commands::next_fire(&ctx, after),
        Command::CheckInput { component, fire_time } => commands::check_input(&ctx, &component, fire_time).await,
        Command::Create => commands::create(&ctx).await,
        Command::Start => commands::start(&ctx).await,
        Command::Stop => commands::stop(&ctx).await,
        Command::Delete { stop_first } => commands::delete(&ctx, stop_first).await,
        Command::Ingest {
            dataset,
            bucket,
            prefix,
            role_arn,
        } => commands::ingest(&ctx, &dataset, &bucket, &prefix, role_arn).await,
        Command::WaitFirst { since, max_wait_secs } => commands::wait_first(&ctx, since, max_wait_secs).await,
        Command::Aggregate {
            since,
            output,
            event_gap_secs,
        } => commands::aggregate(&ctx, since, output.as_deref(), event_gap_secs).await,
    }
}

/// Token cancelled on SIGINT or SIGTERM so blocking waits end cleanly.
fn cancel_on_signal() -> CancelToken {
    let (handle, token) = cancel_pair();
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("Interrupted, cancelling");
        handle.cancel();
    });
    token
}

/// Wait for SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for ctrl_c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {},
                    _ = sigterm.recv() => {},
                }
            }
            Err(e) => {
                warn!(error = %e, "failed to register SIGTERM handler");
                ctrl_c.await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        ctrl_c.await;
    }
}
