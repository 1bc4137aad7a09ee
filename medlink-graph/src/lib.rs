pub mod config;
pub mod models;
pub mod routes;
pub mod schema;
pub mod services;
pub mod store;

use std::sync::Arc;
use std::time::Duration;

use axum::routing::{get, post};
use axum::Router;
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::cors::CorsLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use config::AppConfig;
use services::{GraphQuery, RelationService, Suggester, VisitService};
use store::GraphStore;

pub struct AppState {
    pub config: AppConfig,
    pub store: Arc<dyn GraphStore>,
    pub relations: RelationService,
    pub graph: GraphQuery,
    pub suggester: Suggester,
    pub visits: VisitService,
    pub metrics_handle: Option<PrometheusHandle>,
}

impl AppState {
    /// Wires every service onto the one storage handle.
    pub fn new(config: AppConfig, store: Arc<dyn GraphStore>, metrics_handle: Option<PrometheusHandle>) -> Self {
        Self {
            relations: RelationService::new(store.clone()),
            graph: GraphQuery::new(store.clone()),
            suggester: Suggester::new(store.clone(), config.suggest_settings()),
            visits: VisitService::new(store.clone()),
            store,
            config,
            metrics_handle,
        }
    }
}

pub fn build_router(state: Arc<AppState>) -> Router {
    use routes::{blocks, connections, follows, health, network, users, visitors};

    let timeout = Duration::from_secs(state.config.request_timeout_secs);

    Router::new()
        .route("/health", get(health::health_check))
        .route("/metrics", get(health::metrics))
        // Connections
        .route("/connections", get(connections::list_connections))
        .route("/connections/pending/incoming", get(connections::list_pending_incoming))
        .route("/connections/pending/outgoing", get(connections::list_pending_outgoing))
        .route(
            "/connections/:user_id",
            post(connections::request_connection).delete(connections::remove_connection),
        )
        .route("/connections/:user_id/accept", post(connections::accept_connection))
        .route("/connections/:user_id/status", get(connections::connection_status))
        // Follows and blocks
        .route(
            "/follows/:user_id",
            post(follows::follow).delete(follows::unfollow).get(follows::is_following),
        )
        .route("/blocks", get(blocks::list_blocked))
        .route("/blocks/:user_id", post(blocks::block).delete(blocks::unblock))
        // Public graph views
        .route("/users/:user_id/connections", get(users::connections_of))
        .route("/users/:user_id/followers", get(users::followers_of))
        .route("/users/:user_id/following", get(users::following_of))
        .route("/users/:user_id/stats", get(users::stats_of))
        // Derived queries
        .route("/network/mutual/:user_id", get(network::mutual_connections))
        .route("/network/second-degree", get(network::second_degree))
        .route("/network/path/:user_id", get(network::relationship_path))
        .route("/network/stats", get(network::my_stats))
        .route("/network/suggestions", get(network::suggestions))
        // Profile visits
        .route("/profiles/:user_id/visit", post(visitors::record_visit))
        .route("/profiles/:user_id/visitors", get(visitors::visitors))
        .route("/profiles/:user_id/visit-stats", get(visitors::visit_stats))
        .route("/visits/visited", get(visitors::visited))
        .route_layer(axum::middleware::from_fn(medlink_shared::middleware::metrics_middleware))
        .layer(TimeoutLayer::new(timeout))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
