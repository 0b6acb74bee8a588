//! ucrif-nv library - Novedades record service
//!
//! HTTP API over the shared record repository. All data operations are
//! POSTs under /api behind the authentication middleware; /health stays
//! open for monitoring.

use axum::Router;
use sqlx::SqlitePool;
use ucrif_common::{DocScope, ScopeStrategy};

pub mod api;

/// Application state shared across HTTP handlers
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool
    pub db: SqlitePool,
    /// Shared secret for API authentication (0 disables checking)
    pub shared_secret: i64,
    /// Tenant all records belong to
    pub tenant_id: String,
    /// Scoping strategy fixed at startup
    pub strategy: ScopeStrategy,
}

impl AppState {
    pub fn new(
        db: SqlitePool,
        shared_secret: i64,
        tenant_id: &str,
        strategy: ScopeStrategy,
    ) -> Self {
        Self {
            db,
            shared_secret,
            tenant_id: tenant_id.to_string(),
            strategy,
        }
    }

    /// Scope for one request, carrying the user id from the request body
    pub fn scope_for(&self, user_id: Option<&str>) -> DocScope {
        DocScope::new(&self.tenant_id, self.strategy, user_id)
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    use axum::middleware;
    use axum::routing::post;
    use tower_http::trace::TraceLayer;

    // Protected routes (require authentication)
    let protected = Router::new()
        .route("/api/records/save", post(api::save_record))
        .route("/api/records/load", post(api::load_record))
        .route("/api/records/list", post(api::list_records))
        .route("/api/codes/next", post(api::next_code))
        .route("/api/subrecords/load", post(api::load_sub_collection))
        .route("/api/subrecords/add", post(api::add_related_item))
        .route("/api/tasks/complete", post(api::complete_task))
        .route("/api/tasks/pending", post(api::pending_tasks))
        .route("/api/tasks/add", post(api::add_task))
        .route("/api/stats", post(api::stats))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            api::auth_middleware,
        ));

    // Public routes (no authentication)
    let public = api::health_routes();

    Router::new()
        .merge(protected)
        .merge(public)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
