//! Routes of the application and their middlewares.

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_sessions::{MemoryStore, SessionManagerLayer};

use crate::backend::handlers_auth::{
    create_appointment, create_doctor, create_insurance_provider, create_patient, create_user,
    dashboard, delete_doctor, delete_insurance_provider, delete_patient, delete_user,
    edit_user_page, export_statistics, list_appointments, list_doctors,
    list_insurance_providers, list_patients, list_users, statistics, update_user,
};
use crate::backend::handlers_unauth::{index, login, login_page, logout};
use crate::backend::SharedState;

/// Main router, with the session layer (and permissive CORS in debug builds).
pub fn get_router(state: SharedState) -> Router {
    let session_manager = SessionManagerLayer::new(MemoryStore::default())
        .with_http_only(true)
        .with_secure(!cfg!(debug_assertions));

    let router = unauth_routes()
        .merge(auth_routes())
        .with_state(state)
        .layer(session_manager);

    if cfg!(debug_assertions) {
        let cors = CorsLayer::new()
            .allow_methods(tower_http::cors::AllowMethods::any())
            .allow_origin(Any);
        router.layer(cors)
    } else {
        router
    }
}

/// Routes reachable without a session
fn unauth_routes() -> Router<SharedState> {
    Router::new()
        .route("/", get(index))
        .route("/login", get(login_page).post(login))
        .route("/logout", get(logout))
}

/// Routes needing a session. Each handler extracts the `SessionUser`.
fn auth_routes() -> Router<SharedState> {
    Router::new()
        .route("/dashboard", get(dashboard))
        .route("/doctors", get(list_doctors).post(create_doctor))
        .route("/doctors/:id/delete", post(delete_doctor))
        .route(
            "/insurance-providers",
            get(list_insurance_providers).post(create_insurance_provider),
        )
        .route(
            "/insurance-providers/:id/delete",
            post(delete_insurance_provider),
        )
        .route("/patients", get(list_patients).post(create_patient))
        .route("/patients/:id/delete", post(delete_patient))
        .route("/appointments", get(list_appointments).post(create_appointment))
        .route("/users", get(list_users).post(create_user))
        .route("/users/:id/edit", get(edit_user_page).post(update_user))
        .route("/users/:id/delete", post(delete_user))
        .route("/statistics", get(statistics))
        .route("/statistics/export", get(export_statistics))
}
