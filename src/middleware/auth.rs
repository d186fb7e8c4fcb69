use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::Response,
};
use tracing::{field, warn, Span};

use crate::auth::{extract_from_header, TokenError};
use crate::context::{Identity, RequestContext};
use crate::error::ApiError;
use crate::state::AppState;

/// Bearer-token authentication. On success the validated claims travel on as
/// an [`Identity`] and `user_id` joins the request span.
pub async fn authenticate(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let header = match request.headers().get(AUTHORIZATION) {
        None => "",
        Some(value) => value.to_str().map_err(|_| reject(TokenError::MalformedAuth))?,
    };
    let token = extract_from_header(header).map_err(reject)?;
    let claims = state.tokens.validate(token).map_err(reject)?;
    let identity = Identity::from(claims);

    Span::current().record("user_id", field::display(identity.user_id));
    if let Some(ctx) = request.extensions_mut().get_mut::<RequestContext>() {
        ctx.user_id = Some(identity.user_id);
        ctx.role = identity.role.clone();
    }
    request.extensions_mut().insert(identity);

    Ok(next.run(request).await)
}

fn reject(err: TokenError) -> ApiError {
    warn!(error = %err, "authentication failed");
    match err {
        TokenError::MissingAuth | TokenError::MalformedAuth => ApiError::unauthorized(err.to_string()),
        _ => ApiError::invalid_token("invalid or expired token"),
    }
}
