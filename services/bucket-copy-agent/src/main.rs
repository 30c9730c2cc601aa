// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright 2026 Edgecast Cloud LLC.

//! Bucket Copy Agent Service
//!
//! The bucket copy agent runs on storage targets and executes bucket copy
//! and transform jobs admitted over HTTP. It:
//!
//! - Admits jobs in two phases (`begin`, then `commit`)
//! - Copies the local shard of the source bucket, optionally transforming it
//! - Sends objects owned by other targets and persists objects it receives
//! - Waits for every peer to report completion before finishing

use anyhow::{Context, Result};
use dropshot::{ConfigDropshot, ConfigLogging, ConfigLoggingLevel, HttpServerStarter};
use tracing::info;

use bucket_copy_agent::BucketCopyAgentImpl;
use bucket_copy_agent::config::AgentConfig;
use bucket_copy_agent::context::ApiContext;
use bucket_copy_agent::metrics;

/// Default bind address for the HTTP server.
const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0:8090";

/// Default maximum request body size (bytes).
const DEFAULT_BODY_MAX_BYTES: usize = 1024 * 1024;

fn print_version() {
    let version = env!("CARGO_PKG_VERSION");
    let name = env!("CARGO_PKG_NAME");
    let buildstamp = option_env!("STAMP").unwrap_or("no-STAMP");
    println!("{} {} ({})", name, version, buildstamp);
}

#[tokio::main]
async fn main() -> Result<()> {
    // Handle --version and --help
    let args: Vec<String> = std::env::args().collect();
    #[allow(clippy::never_loop)] // Intentional: early return on first recognized arg
    for arg in &args[1..] {
        match arg.as_str() {
            "-V" | "--version" => {
                print_version();
                return Ok(());
            }
            "-h" | "--help" => {
                print_version();
                println!("Usage: {} [OPTIONS]", args[0]);
                println!();
                println!("Options:");
                println!("  -h, --help       Display this information");
                println!("  -V, --version    Display the program's version number");
                println!();
                println!("Environment variables:");
                println!(
                    "  BIND_ADDRESS             Server bind address (default: {})",
                    DEFAULT_BIND_ADDRESS
                );
                println!(
                    "  DATA_DIR                 Objects and workfiles (default: /var/tmp/bucket-copy)"
                );
                println!("  NODE_ID                  Target identity (default: hostname)");
                println!("  MAX_KEEPALIVE_MS         Optimal quiescence interval (default: 4000)");
                println!("  SEND_FILE_TIMEOUT_SECS   Per-object send timeout (default: 300)");
                println!("  CAPACITY_BYTES           Storage quota, 0 = unlimited (default: 0)");
                println!("  ETL_PARALLEL             Concurrent copies for transforms (default: 2)");
                println!("  MAX_FINISHED_JOBS        Finished jobs kept for queries (default: 1024)");
                println!(
                    "  RUST_LOG                 Log filter (default: bucket_copy_agent=info,dropshot=info)"
                );
                return Ok(());
            }
            _ => {
                eprintln!("Unknown option: {}", arg);
                std::process::exit(1);
            }
        }
    }

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "bucket_copy_agent=info,dropshot=info".to_string()),
        ))
        .init();

    print_version();
    metrics::register_metrics();

    // Load configuration
    let config = AgentConfig::from_env();
    info!(
        node_id = %config.node_id,
        "Data directory: {}",
        config.data_dir.display()
    );

    tokio::fs::create_dir_all(&config.data_dir)
        .await
        .with_context(|| {
            format!(
                "Failed to create data directory: {}",
                config.data_dir.display()
            )
        })?;

    // Create API context
    let api_context = ApiContext::new(config)
        .await
        .context("Failed to create API context")?;

    let api = bucket_copy_api::bucket_copy_api_mod::api_description::<BucketCopyAgentImpl>()
        .map_err(|e| anyhow::anyhow!("Failed to create API description: {}", e))?;

    let bind_address = std::env::var("BIND_ADDRESS")
        .unwrap_or_else(|_| DEFAULT_BIND_ADDRESS.to_string())
        .parse()
        .context("Invalid BIND_ADDRESS")?;

    let config_dropshot = ConfigDropshot {
        bind_address,
        default_request_body_max_bytes: DEFAULT_BODY_MAX_BYTES,
        default_handler_task_mode: dropshot::HandlerTaskMode::Detached,
        ..Default::default()
    };

    let config_logging = ConfigLogging::StderrTerminal {
        level: ConfigLoggingLevel::Info,
    };

    let log = config_logging
        .to_logger("bucket-copy-agent")
        .map_err(|error| anyhow::anyhow!("failed to create logger: {}", error))?;

    let server = HttpServerStarter::new(&config_dropshot, api, api_context, &log)
        .map_err(|error| anyhow::anyhow!("failed to create server: {}", error))?
        .start();

    info!("Bucket copy agent running on http://{}", bind_address);

    server
        .await
        .map_err(|error| anyhow::anyhow!("server failed: {}", error))
}
