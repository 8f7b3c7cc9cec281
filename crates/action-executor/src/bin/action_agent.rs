/*
 * 5D Labs Agent Platform - Horizontal Scaling Action Executor
 * Copyright (C) 2025 5D Labs
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU Affero General Public License as published
 * by the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
 * GNU Affero General Public License for more details.
 *
 * You should have received a copy of the GNU Affero General Public License
 * along with this program. If not, see <https://www.gnu.org/licenses/>.
 */

//! Action Agent - in-cluster executor for horizontal scaling actions
//!
//! This service:
//! - Accepts provision and unbind actions over HTTP and executes each on its own task
//! - Watches pods and hands newly created ones to waiting scale-out actions
//! - Binds new pods to nodes
//! - Serves action status and health endpoints

use std::sync::Arc;

use action_executor::config::CONFIG_PATH_ENV;
use action_executor::server::{self, AppState};
use action_executor::watch::PodCreationWatcher;
use action_executor::{
    ActionRegistry, BindingPlacer, ExecutorConfig, HorizontalScaler, InMemoryPodBroker,
    KubeCluster, PodBroker,
};
use anyhow::{Context, Result};
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    info!(
        "Starting 5D Labs Action Agent v{}",
        env!("CARGO_PKG_VERSION")
    );

    let config = ExecutorConfig::load(std::env::var(CONFIG_PATH_ENV).ok().as_deref());
    config.validate().context("invalid executor configuration")?;

    let client = kube::Client::try_default()
        .await
        .context("failed to build Kubernetes client")?;
    info!("Connected to Kubernetes cluster");

    let broker = Arc::new(InMemoryPodBroker::new());
    let scaler = Arc::new(HorizontalScaler::new(
        Arc::new(KubeCluster::new(client.clone())),
        broker.clone(),
        Arc::new(BindingPlacer::new(client.clone())),
        ActionRegistry::new(),
        &config,
    ));

    let watcher_handle = {
        let watcher =
            PodCreationWatcher::new(client.clone(), broker.clone(), config.watch_namespace.clone());
        tokio::spawn(watcher.run())
    };

    let app = server::router(AppState::new(scaler));

    let listener = tokio::net::TcpListener::bind(&config.listen_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.listen_addr))?;
    info!("Action agent HTTP server listening on {}", config.listen_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")?;

    // Waiting scale-outs observe a closed broker instead of running into their deadline.
    broker.close();
    watcher_handle.abort();
    info!("Action agent stopped");

    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,action_executor=debug".into());
    let json_output = std::env::var("LOG_FORMAT").is_ok_and(|format| format == "json");

    let registry = tracing_subscriber::registry().with(filter);
    if json_output {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("Received Ctrl+C, shutting down gracefully");
        },
        () = terminate => {
            info!("Received SIGTERM, shutting down gracefully");
        },
    }
}
