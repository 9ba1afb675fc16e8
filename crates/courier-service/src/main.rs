//! Main entry point for the courier order service.
//!
//! Loads configuration, wires the order lifecycle engine to its storage and
//! authentication backends, and serves the HTTP API.

use clap::Parser;
use courier_config::Config;
use courier_types::{CourierEvent, OrderEvent};
use std::path::PathBuf;
use tokio::sync::broadcast::{error::RecvError, Receiver};

mod apis;
mod factory_registry;
mod server;

/// Command-line arguments for the courier service.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
	/// Path to configuration file
	#[arg(short, long, default_value = "config.toml")]
	config: PathBuf,

	/// Log level (trace, debug, info, warn, error)
	#[arg(short, long, default_value = "info")]
	log_level: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
	let args = Args::parse();

	use tracing_subscriber::{fmt, EnvFilter};

	let env_filter =
		EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

	fmt()
		.with_env_filter(env_filter)
		.with_thread_ids(true)
		.with_target(true)
		.init();

	tracing::info!("Started courier");

	let config_path = args.config.to_string_lossy();
	let config = Config::from_file(&config_path).await?;
	tracing::info!("Loaded configuration [{}]", config.service.id);

	let courier = factory_registry::build_courier_from_config(config)?;
	let notifications = tokio::spawn(log_events(courier.engine.event_bus().subscribe()));

	match courier.config.api.clone().filter(|api| api.enabled) {
		Some(api_config) => {
			tokio::select! {
				result = server::start_server(api_config, courier.engine.clone(), courier.auth.clone()) => {
					tracing::info!("API server finished");
					result?;
				}
				_ = tokio::signal::ctrl_c() => {
					tracing::info!("Shutdown requested");
				}
			}
		},
		None => {
			tracing::warn!("API server disabled, nothing to serve");
		},
	}

	notifications.abort();
	tracing::info!("Stopped courier");
	Ok(())
}

/// Logs committed order events until the bus closes.
async fn log_events(mut receiver: Receiver<CourierEvent>) {
	loop {
		match receiver.recv().await {
			Ok(CourierEvent::Order(event)) => match event {
				OrderEvent::Placed {
					order_id,
					restaurant_id,
					customer_id,
				} => tracing::info!(order_id, restaurant_id, customer_id, "Order placed"),
				OrderEvent::StatusChanged {
					order_id,
					from,
					to,
					actor,
					record_id,
				} => tracing::info!(
					order_id,
					%from,
					%to,
					%actor,
					%record_id,
					"Order status changed"
				),
				OrderEvent::DriverAssigned {
					order_id,
					driver_id,
				} => tracing::info!(order_id, driver_id, "Driver assigned"),
			},
			Err(RecvError::Lagged(skipped)) => {
				tracing::warn!(skipped, "Event log fell behind");
			},
			Err(RecvError::Closed) => break,
		}
	}
}
