//! Extractors whose rejections use the JSON error envelope.

use axum::{
    async_trait,
    extract::{FromRequest, FromRequestParts, Path, Query, Request},
    http::request::Parts,
    Json,
};
use serde::de::DeserializeOwned;
use tracing::warn;
use validator::Validate;

use crate::error::ApiError;

/// JSON body, deserialized then checked with `validator`.
pub struct ValidJson<T>(pub T);

#[async_trait]
impl<T, S> FromRequest<S> for ValidJson<T>
where
    T: DeserializeOwned + Validate,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(request: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(request, state).await.map_err(|rejection| {
            let reason = rejection.body_text();
            warn!(%reason, "request body rejected");
            ApiError::invalid_input(reason)
        })?;

        if let Err(errors) = value.validate() {
            warn!(%errors, "request body failed validation");
            return Err(errors.into());
        }
        Ok(ValidJson(value))
    }
}

/// Query string deserialization with an enveloped 400.
pub struct ApiQuery<T>(pub T);

#[async_trait]
impl<T, S> FromRequestParts<S> for ApiQuery<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Query(value) = Query::<T>::from_request_parts(parts, state).await.map_err(|rejection| {
            let reason = rejection.body_text();
            warn!(%reason, "query string rejected");
            ApiError::invalid_input(reason)
        })?;
        Ok(ApiQuery(value))
    }
}

/// Path parameters, e.g. an entity id that must be a UUID.
pub struct ApiPath<T>(pub T);

#[async_trait]
impl<T, S> FromRequestParts<S> for ApiPath<T>
where
    T: DeserializeOwned + Send,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Path(value) = Path::<T>::from_request_parts(parts, state).await.map_err(|rejection| {
            let reason = rejection.body_text();
            warn!(%reason, "path parameter rejected");
            ApiError::invalid_input(reason)
        })?;
        Ok(ApiPath(value))
    }
}
