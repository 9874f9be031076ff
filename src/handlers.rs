// src/handlers.rs

use axum::{
    middleware as axum_middleware,
    routing::{get, post},
    Router,
};

use crate::{config::AppState, middleware::auth::auth_guard};

pub mod access;
pub mod diagnostics;
pub mod households;
pub mod reports;
pub mod residents;

/// Rotas da API. Tudo abaixo de `/api`, exceto o health check, passa pelo
/// `auth_guard`.
pub fn router(app_state: AppState) -> Router {
    let access_routes = Router::new().route("/decide", post(access::decide));

    let household_routes = Router::new()
        .route("/", post(households::create_household))
        .route(
            "/{code}",
            get(households::get_household).patch(households::update_household),
        )
        .route("/{code}/relocate", post(households::relocate_household));

    let resident_routes = Router::new()
        .route(
            "/",
            post(residents::create_resident).get(residents::list_residents),
        )
        .route(
            "/{id}",
            get(residents::get_resident).delete(residents::deactivate_resident),
        )
        .route("/{id}/household", post(residents::move_resident));

    let report_routes = Router::new()
        .route("/residents", get(reports::resident_report))
        .route("/barangays", get(reports::barangay_summary));

    let admin_routes = Router::new().route("/residents/deactivate", post(reports::bulk_deactivate));

    let diagnostic_routes = Router::new()
        .route("/parity", post(diagnostics::check_parity))
        .route("/drift/{code}", get(diagnostics::check_drift))
        .route("/drift-scan", post(diagnostics::scan_drift))
        .route("/codes/{code}", get(diagnostics::check_code))
        .route("/repair/{code}", post(diagnostics::repair));

    let protected = Router::new()
        .nest("/access", access_routes)
        .nest("/households", household_routes)
        .nest("/residents", resident_routes)
        .nest("/reports", report_routes)
        .nest("/admin", admin_routes)
        .nest("/diagnostics", diagnostic_routes)
        .layer(axum_middleware::from_fn_with_state(app_state.clone(), auth_guard));

    Router::new()
        .route("/api/health", get(|| async { "OK" }))
        .nest("/api", protected)
        .with_state(app_state)
}
