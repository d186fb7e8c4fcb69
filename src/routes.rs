use axum::{
    body::Body,
    http::Request,
    middleware::{from_fn, from_fn_with_state},
    routing::{get, post},
    Router,
};
use tower_http::trace::{DefaultOnResponse, TraceLayer};
use tracing::{Level, Span};

use crate::handlers::{protected, public};
use crate::middleware::{
    authenticate, cors_layer, preflight_no_content, request_context, require_role, require_tenant,
    resolve_tenant, RoleGate,
};
use crate::state::AppState;

pub const USER_ROLES: &[&str] = &["admin"];
pub const STUDENT_ROLES: &[&str] = &["admin", "teacher"];
pub const CLASS_ROLES: &[&str] = &["admin", "teacher"];

/// Full application router.
///
/// Request order, outermost first: request id + access log → CORS →
/// authentication → tenant resolution → tenant gate → role gate → handler.
pub fn app(state: AppState) -> Router {
    let cors = state.config.app.cors.clone();

    let router = Router::new()
        .merge(public_routes())
        .merge(session_routes(&state))
        .merge(tenant_routes(&state, user_routes(), USER_ROLES))
        .merge(tenant_routes(&state, student_routes(), STUDENT_ROLES))
        .merge(tenant_routes(&state, class_routes(), CLASS_ROLES))
        .with_state(state);

    let router = if cors.enable {
        router
            .layer(cors_layer(&cors))
            .layer(from_fn(preflight_no_content))
    } else {
        router
    };

    router
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|_request: &Request<Body>| Span::current())
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(from_fn(request_context))
}

fn public_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(public::root_get))
        .route("/v1/health", get(public::health_get))
        .route("/v1/auth/login", post(public::login_post))
        .route("/v1/auth/register", post(public::register_post))
}

/// Any valid token, with or without a tenant.
fn session_routes(state: &AppState) -> Router<AppState> {
    use protected::auth;

    Router::new()
        .route("/v1/auth/change-password", post(auth::change_password_post))
        .route("/v1/auth/tenants", get(auth::tenants_get))
        .route("/v1/auth/select-tenant", post(auth::select_tenant_post))
        .route("/v1/auth/me", get(auth::me_get))
        .route_layer(from_fn_with_state(state.clone(), authenticate))
}

/// Wrap a collection in the tenant chain. `route_layer` calls nest inside
/// out, so authentication is added last.
fn tenant_routes(state: &AppState, routes: Router<AppState>, roles: &[&str]) -> Router<AppState> {
    routes
        .route_layer(from_fn_with_state(RoleGate::new(roles.iter().copied()), require_role))
        .route_layer(from_fn_with_state(state.clone(), require_tenant))
        .route_layer(from_fn_with_state(state.clone(), resolve_tenant))
        .route_layer(from_fn_with_state(state.clone(), authenticate))
}

fn user_routes() -> Router<AppState> {
    use protected::users::*;

    Router::new()
        .route("/v1/users", get(users_list).post(users_create))
        .route("/v1/users/bulk-delete", post(users_bulk_delete))
        .route("/v1/users/:id", get(users_get).put(users_update).delete(users_delete))
}

fn student_routes() -> Router<AppState> {
    use protected::students::*;

    Router::new()
        .route("/v1/students", get(students_list).post(students_create))
        .route("/v1/students/bulk-delete", post(students_bulk_delete))
        .route("/v1/students/by-number/:student_number", get(students_get_by_number))
        .route(
            "/v1/students/:id",
            get(students_get).put(students_update).delete(students_delete),
        )
}

fn class_routes() -> Router<AppState> {
    use protected::classes::*;

    Router::new()
        .route("/v1/classes", get(classes_list).post(classes_create))
        .route("/v1/classes/bulk-delete", post(classes_bulk_delete))
        .route("/v1/classes/:id/students", get(classes_students))
        .route(
            "/v1/classes/:id",
            get(classes_get).put(classes_update).delete(classes_delete),
        )
}
