// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Ferry scheduled data synchronization server binary.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use ferry_server::{publish_trigger, version, Server};
use ferry_server_config::{LogFormat, LoggingConfig, ServerConfig};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "ferry-server", about = "Scheduled data synchronization server", version)]
struct Args {
	/// Config file used in place of /etc/ferry/server.toml
	#[arg(long, global = true, env = "FERRY_SERVER_CONFIG")]
	config: Option<PathBuf>,

	#[command(subcommand)]
	command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
	/// Run the scheduler, command processor and retention loops (default)
	Serve,
	/// Ask the scheduler process to run a job now
	Trigger {
		job_id: String,
		/// Recorded as the requester on the run
		#[arg(long, default_value = "cli")]
		by: String,
	},
	/// Print job health as JSON
	Status,
	/// Show version and build information
	Version,
}

fn init_tracing(logging: &LoggingConfig) {
	let filter =
		EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));
	let registry = tracing_subscriber::registry().with(filter);
	match logging.format {
		LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
		LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
	}
}

fn load_config(path: Option<PathBuf>) -> anyhow::Result<ServerConfig> {
	let config = match path {
		Some(path) => ferry_server_config::load_config_with_file(path)?,
		None => ferry_server_config::load_config()?,
	};
	Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
	let args = Args::parse();

	if let Some(Command::Version) = args.command {
		println!("{}", version::format_version_info());
		return Ok(());
	}

	dotenvy::dotenv().ok();

	let config = load_config(args.config)?;
	init_tracing(&config.logging);

	match args.command.unwrap_or(Command::Serve) {
		Command::Serve => serve(config).await,
		Command::Trigger { job_id, by } => {
			let command = publish_trigger(&config.queue, &job_id, &by).await?;
			tracing::info!(command_id = %command.id, job_id = %job_id, "trigger queued");
			println!("{}", command.id);
			Ok(())
		}
		Command::Status => {
			let server = Server::build(&config).await?;
			let status = server.health_status().await?;
			println!("{}", serde_json::to_string_pretty(&status)?);
			Ok(())
		}
		Command::Version => Ok(()),
	}
}

async fn serve(config: ServerConfig) -> anyhow::Result<()> {
	tracing::info!(
		database = %config.database.url,
		instance_id = %config.scheduler.instance_id,
		"starting ferry-server"
	);

	let server = Server::build(&config).await?;
	let shutdown = CancellationToken::new();

	let signal = shutdown.clone();
	tokio::spawn(async move {
		match tokio::signal::ctrl_c().await {
			Ok(()) => {
				tracing::info!("Received shutdown signal");
				signal.cancel();
			}
			Err(e) => tracing::error!(error = %e, "failed to listen for shutdown signal"),
		}
	});

	server.run(shutdown).await;
	tracing::info!("Server shutdown complete");
	Ok(())
}
