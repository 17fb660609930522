use crate::config::Settings;
use axum::{
    Json, Router,
    extract::{Path, State},
    http::{HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use ringkv_core::{
    ClusterClient, Coordinator, INTERNAL_RPC_PATH, MembershipTable, Node, PeerDirectory,
    RemoteCoordinator, Result, RingError, StaticCoordinator, UNREACHABLE_HEADER, dispatch,
};
use std::collections::BTreeSet;
use std::future::{Future, IntoFuture};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

pub struct ServerState {
    pub node: Arc<Node>,
    /// Present only on the leader.
    pub membership: Option<Arc<MembershipTable>>,
}

pub struct ServerOptions {
    pub name: String,
    pub config_dir: PathBuf,
    pub leader: bool,
    pub settings: Settings,
}

pub async fn run_server(options: ServerOptions) -> Result<()> {
    let ServerOptions {
        name,
        config_dir,
        leader,
        settings,
    } = options;

    verify_peer_rings(&config_dir, &name, &settings)?;
    let ring_members = settings.ring_members(&name);

    let peers = Arc::new(PeerDirectory::new(config_dir));
    peers.insert(name.clone(), settings.peer_config())?;

    let membership = if leader {
        Some(Arc::new(MembershipTable::new(ring_members.iter().cloned())))
    } else {
        None
    };

    let coordinator: Arc<dyn Coordinator> = match (&membership, &settings.coordinator) {
        (Some(table), _) => table.clone(),
        (None, Some(address)) => Arc::new(RemoteCoordinator::new(address)),
        (None, None) => Arc::new(StaticCoordinator::new(settings.members.clone())),
    };

    if let Err(error) = coordinator.announce_up(&name).await {
        tracing::warn!("Failed to announce {} as up: {}", name, error);
    }

    match coordinator.current_members().await {
        Ok(reported) => check_reported_members(&reported, &ring_members)?,
        Err(error) => {
            tracing::warn!(
                "Failed to fetch members from coordinator, using configured members: {}",
                error
            );
        }
    }

    let transport = Arc::new(ClusterClient::new(peers));
    let node = Arc::new(Node::new(
        name.clone(),
        settings.members.clone(),
        settings.node_options(),
        transport,
    )?);

    let state = Arc::new(ServerState { node, membership });
    let app = router(state);

    let bind_addr = settings.bind_address();
    let listener = TcpListener::bind(&bind_addr).await?;
    tracing::info!("Node {} listening on {}", name, bind_addr);

    serve_with_deadline(
        listener,
        app,
        shutdown_signal(coordinator, name),
        settings.shutdown_grace(),
    )
    .await
}

/// Every configured member must build the ring this node builds.
///
/// Members whose descriptor cannot be read here are skipped.
fn verify_peer_rings(
    config_dir: &std::path::Path,
    name: &str,
    settings: &Settings,
) -> Result<()> {
    for member in settings.ring_members(name) {
        if member == name {
            continue;
        }
        match Settings::load(config_dir, &member) {
            Ok(peer) => settings.check_same_ring(name, &member, &peer)?,
            Err(error) => {
                tracing::warn!("Cannot check ring layout of {}: {}", member, error);
            }
        }
    }
    Ok(())
}

/// The coordinator may not know nodes outside the configured ring.
fn check_reported_members(reported: &[String], ring_members: &BTreeSet<String>) -> Result<()> {
    let unknown: Vec<&String> = reported
        .iter()
        .filter(|member| !ring_members.contains(member.as_str()))
        .collect();
    if unknown.is_empty() {
        return Ok(());
    }
    Err(RingError::Config(format!(
        "coordinator reports members outside the configured ring: {:?}",
        unknown
    )))
}

/// Serves `app` until `shutdown` resolves, then lets in-flight requests
/// finish for at most `grace`.
pub async fn serve_with_deadline<F>(
    listener: TcpListener,
    app: Router,
    shutdown: F,
    grace: Duration,
) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let (stopping_tx, stopping_rx) = watch::channel(false);
    let server = axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown.await;
            let _ = stopping_tx.send(true);
        })
        .into_future();

    tokio::select! {
        result = server => result?,
        _ = drain_deadline(stopping_rx, grace) => {
            tracing::warn!(
                "Requests still in flight {:?} after shutdown, abandoning them",
                grace
            );
        }
    }
    Ok(())
}

async fn drain_deadline(mut stopping: watch::Receiver<bool>, grace: Duration) {
    while !*stopping.borrow_and_update() {
        if stopping.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
    tokio::time::sleep(grace).await;
}

pub fn router(state: Arc<ServerState>) -> Router {
    let mut app: Router<Arc<ServerState>> = Router::new()
        .route("/health", get(health_handler))
        .route(INTERNAL_RPC_PATH, post(rpc_handler));

    if state.membership.is_some() {
        app = app
            .route("/coordinator/members", get(list_members))
            .route("/coordinator/up/:name", post(member_up))
            .route("/coordinator/down/:name", post(member_down));
    }

    app.layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
        .with_state(state)
}

async fn shutdown_signal(coordinator: Arc<dyn Coordinator>, name: String) {
    if let Err(error) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", error);
        std::future::pending::<()>().await;
    }

    tracing::info!("Shutting down node {}", name);
    if let Err(error) = coordinator.announce_down(&name).await {
        tracing::warn!("Failed to announce {} as down: {}", name, error);
    }
}

async fn health_handler(State(state): State<Arc<ServerState>>) -> impl IntoResponse {
    let ring = state.node.ring();
    let response = serde_json::json!({
        "node": state.node.name(),
        "members": ring.members(),
        "partitions": ring.partition_count(),
        "stored_keys": state.node.store().len().await,
        "leader": state.membership.is_some(),
    });

    (StatusCode::OK, Json(response))
}

async fn rpc_handler(State(state): State<Arc<ServerState>>, body: String) -> Response {
    match dispatch(&state.node, &body).await {
        Ok(reply) => {
            let mut response = (StatusCode::OK, reply.body).into_response();
            if !reply.unreachable.is_empty() {
                match HeaderValue::from_str(&reply.unreachable.join(",")) {
                    Ok(value) => {
                        response.headers_mut().insert(UNREACHABLE_HEADER, value);
                    }
                    Err(error) => {
                        tracing::warn!("Unreachable list is not a valid header: {}", error);
                    }
                }
            }
            response
        }
        Err(error) => error_response(error),
    }
}

async fn list_members(State(state): State<Arc<ServerState>>) -> Response {
    match &state.membership {
        Some(table) => (StatusCode::OK, Json(table.statuses().await)).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn member_up(
    State(state): State<Arc<ServerState>>,
    Path(name): Path<String>,
) -> Response {
    match &state.membership {
        Some(table) => match table.announce_up(&name).await {
            Ok(()) => StatusCode::NO_CONTENT.into_response(),
            Err(error) => error_response(error),
        },
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn member_down(
    State(state): State<Arc<ServerState>>,
    Path(name): Path<String>,
) -> Response {
    match &state.membership {
        Some(table) => match table.announce_down(&name).await {
            Ok(()) => StatusCode::NO_CONTENT.into_response(),
            Err(error) => error_response(error),
        },
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

fn error_status(error: &RingError) -> StatusCode {
    match error {
        RingError::InvalidRequest(_) | RingError::MalformedClockToken(_) => {
            StatusCode::BAD_REQUEST
        }
        RingError::UnknownNodeConfiguration(_)
        | RingError::ReplicaUnavailable { .. }
        | RingError::Remote { .. } => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn error_response(error: RingError) -> Response {
    let status = error_status(&error);
    if status.is_server_error() {
        tracing::error!("Request failed: {}", error);
    } else {
        tracing::debug!("Rejected request: {}", error);
    }
    (status, error.to_string()).into_response()
}
