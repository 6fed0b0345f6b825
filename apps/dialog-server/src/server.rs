use anyhow::{Context, Result};
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::Router;
use futures::stream::StreamExt;
use signal_hook::consts::signal::{SIGINT, SIGTERM};
use signal_hook_tokio::Signals;
use std::net::SocketAddr;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tonic::transport::{Certificate, Identity, Server as TonicServer, ServerTlsConfig};
use tracing::{info, warn};

use crate::app::AppState;
use crate::tls::TlsMaterial;

/// How long in-flight streams may drain after a shutdown signal.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

pub struct Server {
    state: AppState,
    tls: Option<TlsMaterial>,
}

impl Server {
    pub fn new(state: AppState, tls: Option<TlsMaterial>) -> Self {
        Self { state, tls }
    }

    pub async fn run(self) -> Result<()> {
        let shutdown = CancellationToken::new();

        let mut signals =
            Signals::new([SIGINT, SIGTERM]).context("Failed to install signal handlers")?;
        let signals_handle = signals.handle();
        {
            let shutdown = shutdown.clone();
            tokio::spawn(async move {
                if let Some(signal) = signals.next().await {
                    info!(signal, "shutdown signal received");
                    shutdown.cancel();
                }
            });
        }

        let grpc_addr = SocketAddr::from(([0, 0, 0, 0], self.state.config.grpc_port));
        let http_addr = SocketAddr::from(([0, 0, 0, 0], self.state.config.http_port));

        // gRPC server, optionally behind (m)TLS
        let mut builder = TonicServer::builder();
        if let Some(material) = &self.tls {
            let mut tls_config = ServerTlsConfig::new()
                .identity(Identity::from_pem(&material.cert, &material.key));
            if let Some(ca) = &material.ca {
                tls_config = tls_config.client_ca_root(Certificate::from_pem(ca));
                info!("mTLS active, client certificates required");
            } else {
                info!("TLS active without client verification");
            }
            builder = builder
                .tls_config(tls_config)
                .context("Invalid TLS configuration")?;
        }
        let grpc = builder
            .add_service(self.state.grpc_service().into_server())
            .serve_with_shutdown(grpc_addr, {
                let shutdown = shutdown.clone();
                async move { shutdown.cancelled().await }
            });
        info!(%grpc_addr, "gRPC server listening");

        // Health HTTP server
        let router = Router::new()
            .route("/health", get(health_check))
            .route("/ready", get(readiness_check))
            .with_state(self.state.clone());
        let listener = tokio::net::TcpListener::bind(http_addr)
            .await
            .context("Failed to bind health endpoint")?;
        info!(%http_addr, "HTTP server listening");
        let http = axum::serve(listener, router.into_make_service()).with_graceful_shutdown({
            let shutdown = shutdown.clone();
            async move { shutdown.cancelled().await }
        });

        let mut grpc_task = tokio::spawn(grpc);
        let mut http_task = tokio::spawn(async move { http.await });

        tokio::select! {
            _ = shutdown.cancelled() => {
                info!("draining in-flight streams");
                let drain = async {
                    let _ = (&mut grpc_task).await;
                    let _ = (&mut http_task).await;
                };
                if tokio::time::timeout(SHUTDOWN_GRACE, drain).await.is_err() {
                    warn!("drain deadline exceeded, forcing stop");
                    grpc_task.abort();
                    http_task.abort();
                }
            }
            result = &mut grpc_task => {
                result.context("gRPC server task failed")??;
            }
            result = &mut http_task => {
                result.context("HTTP server task failed")??;
            }
        }

        signals_handle.close();
        info!("service stopped");
        Ok(())
    }
}

// Route handlers

async fn health_check() -> &'static str {
    "OK"
}

async fn readiness_check(State(state): State<AppState>) -> StatusCode {
    match state.health_check().await {
        Ok(_) => StatusCode::OK,
        Err(_) => StatusCode::SERVICE_UNAVAILABLE,
    }
}
