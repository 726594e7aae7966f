// SPDX-License-Identifier: AGPL-3.0-or-later
//! Czech File Knife gateway server.
//!
//! Two listeners share one [`state::AppState`]: an `axum` router serving
//! the `/api/fs/*` JSON API, and a raw `hyper` connection loop serving
//! `dav_server`'s [`DavHandler`] on the WebDAV surface -- the same split
//! the sibling gateway this crate is grounded on uses, since `DavHandler`
//! speaks `hyper` directly rather than through an `axum` service.

mod config;
mod error;
mod logging;
mod routes;
mod state;
mod webdav;

use std::convert::Infallible;
use std::net::SocketAddr;

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post, put};
use axum::Router;
use clap::Parser;
use dav_server::DavHandler;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;
use tracing::Span;

use config::GatewayConfig;
use state::AppState;
use webdav::GatewayDavFs;

#[derive(Parser)]
#[command(name = "cfk-server")]
#[command(author, version, about = "Czech File Knife multi-backend storage gateway", long_about = None)]
struct Cli {
    /// Path to the gateway TOML config file.
    #[arg(short, long)]
    config: Option<std::path::PathBuf>,
}

fn build_api_router(state: AppState) -> Router {
    Router::new()
        .route("/api/fs/list", get(routes::fs::list))
        .route("/api/fs/stat", get(routes::fs::stat))
        .route("/api/fs/download", get(routes::fs::download))
        .route("/api/fs/mkdir", post(routes::fs::mkdir))
        .route("/api/fs/rename", post(routes::fs::rename))
        .route("/api/fs/copy", post(routes::fs::copy))
        .route("/api/fs/batch-delete", post(routes::fs::batch_delete))
        .route("/api/fs/upload-direct", post(routes::fs::upload_direct))
        .route("/api/fs/multipart/init", post(routes::fs::multipart_init))
        .route("/api/fs/multipart/upload-chunk", put(routes::fs::multipart_upload_chunk))
        .route("/api/fs/multipart/complete", post(routes::fs::multipart_complete))
        .route("/api/fs/multipart/abort", post(routes::fs::multipart_abort))
        .route("/api/fs/multipart/list", get(routes::fs::multipart_list))
        .route("/api/fs/multipart/parts", get(routes::fs::multipart_parts))
        .route("/api/fs/multipart/refresh-urls", post(routes::fs::multipart_refresh_urls))
        .route("/api/fs/link", get(routes::fs::link))
        .route("/api/p/*path", get(routes::fs::proxy))
        .layer(DefaultBodyLimit::disable())
        // request id must be assigned before `TraceLayer` sees the request,
        // and propagated onto the response after `TraceLayer` is done with it.
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|req: &axum::http::Request<_>| {
                    let request_id =
                        req.headers().get("x-request-id").and_then(|v| v.to_str().ok()).unwrap_or("-").to_string();
                    tracing::info_span!("request", reqId = %request_id, method = %req.method(), path = %req.uri().path())
                })
                .on_response(|response: &axum::http::Response<_>, latency: std::time::Duration, span: &Span| {
                    let _ = span.enter();
                    tracing::info!(status = response.status().as_u16(), durationMs = latency.as_millis() as u64, "request completed");
                }),
        )
        .layer(PropagateRequestIdLayer::x_request_id())
        .with_state(state)
}

async fn run_webdav(state: AppState) -> std::io::Result<()> {
    let addr: SocketAddr = state.config.listen.webdav_addr.parse().map_err(std::io::Error::other)?;
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(%addr, "webdav listener started");

    let prefix = state.config.listen.webdav_prefix.clone();
    let fs = state.fs.clone();

    loop {
        let (stream, remote_addr) = listener.accept().await?;
        let io = TokioIo::new(stream);
        let fs = fs.clone();
        let prefix = prefix.clone();

        tokio::spawn(async move {
            let service = service_fn(move |req: hyper::Request<hyper::body::Incoming>| {
                let fs = fs.clone();
                let prefix = prefix.clone();
                async move {
                    let handler = DavHandler::builder()
                        .filesystem(Box::new(GatewayDavFs::new(fs)))
                        .locksystem(dav_server::memls::MemLs::new())
                        .strip_prefix(&prefix)
                        .build_handler();
                    Ok::<_, Infallible>(handler.handle(req).await)
                }
            });

            if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
                tracing::warn!(%remote_addr, error = %err, "webdav connection error");
            }
        });
    }
}

#[tokio::main]
async fn main() -> std::process::ExitCode {
    logging::init();

    let cli = Cli::parse();
    let config = match GatewayConfig::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, "failed to load gateway config");
            return std::process::ExitCode::FAILURE;
        }
    };

    let api_addr: SocketAddr = match config.listen.api_addr.parse() {
        Ok(addr) => addr,
        Err(e) => {
            tracing::error!(error = %e, "invalid api listen address");
            return std::process::ExitCode::FAILURE;
        }
    };

    let state = match AppState::bootstrap(config).await {
        Ok(state) => state,
        Err(e) => {
            tracing::error!(error = %e, "failed to bootstrap gateway state");
            return std::process::ExitCode::FAILURE;
        }
    };

    let api_router = build_api_router(state.clone());
    let webdav_state = state.clone();

    let api_server = async move {
        let listener = TcpListener::bind(api_addr).await?;
        tracing::info!(%api_addr, "json api listener started");
        axum::serve(listener, api_router).await
    };

    let result = tokio::try_join!(
        async { api_server.await.map_err(std::io::Error::other) },
        run_webdav(webdav_state),
    );

    match result {
        Ok(_) => std::process::ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "server terminated");
            std::process::ExitCode::FAILURE
        }
    }
}

