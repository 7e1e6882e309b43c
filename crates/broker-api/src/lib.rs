//! broker-api: HTTP surface of the stub broker.
//!
//! Exposes the broker protocol routes plus the `/config` family used by
//! tests to script behaviors at runtime.
//!
//! # Routes
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | GET | `/v2/catalog` | Catalog |
//! | PUT | `/v2/service_instances/{id}` | Provision |
//! | GET | `/v2/service_instances/{id}` | Poll last operation |
//! | PATCH | `/v2/service_instances/{id}` | Update |
//! | DELETE | `/v2/service_instances/{id}` | Deprovision |
//! | PUT | `/v2/service_instances/{id}/service_bindings/{binding_id}` | Bind |
//! | DELETE | `/v2/service_instances/{id}/service_bindings/{binding_id}` | Unbind |
//! | GET | `/config` | Configuration without instances |
//! | GET | `/config/all` | Full configuration |
//! | POST | `/config` | Merge configuration |
//! | POST | `/config/reset` | Restore the bootstrap document |
//!
//! Catalog, instance, and config routes also answer with a trailing slash.

pub mod error;
pub mod handlers;

use axum::Router;
use axum::extract::Request;
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{MethodRouter, get, post, put};
use broker_state::{ConfigStore, SimulationEngine};
use tracing::info;

/// Shared state for API handlers.
#[derive(Clone)]
pub struct ApiState {
    pub engine: SimulationEngine,
}

/// Build the complete broker router over `store`.
pub fn build_router(store: ConfigStore) -> Router {
    let state = ApiState {
        engine: SimulationEngine::new(store),
    };

    let router = Router::new();
    let router = slashed(router, "/v2/catalog", get(handlers::catalog));
    let router = slashed(
        router,
        "/v2/service_instances/{instance_id}",
        put(handlers::provision)
            .get(handlers::fetch_status)
            .patch(handlers::update)
            .delete(handlers::deprovision),
    );
    let router = slashed(
        router,
        "/config",
        get(handlers::get_config).post(handlers::merge_config),
    );
    let router = slashed(router, "/config/all", get(handlers::get_config_all));
    let router = slashed(router, "/config/reset", post(handlers::reset_config));

    router
        .route(
            "/v2/service_instances/{instance_id}/service_bindings/{binding_id}",
            put(handlers::bind).delete(handlers::unbind),
        )
        .layer(middleware::from_fn(log_request))
        .with_state(state)
}

/// Mount `method_router` at `path` and at `path/`.
fn slashed(
    router: Router<ApiState>,
    path: &str,
    method_router: MethodRouter<ApiState>,
) -> Router<ApiState> {
    router
        .route(path, method_router.clone())
        .route(&format!("{path}/"), method_router)
}

async fn log_request(request: Request, next: Next) -> Response {
    info!(
        method = %request.method(),
        path = request.uri().path(),
        query = request.uri().query().unwrap_or(""),
        "broker request"
    );
    next.run(request).await
}
