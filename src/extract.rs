//! Request extractors whose rejections use the service's error body.
//!
//! axum's own `Json`, `Path` and `Query` reject with plain-text bodies and,
//! for well-formed JSON of the wrong shape, a 422. These wrappers turn every
//! rejection into [`AppError::Validation`].

use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::extract::{FromRequest, FromRequestParts};
use tracing::debug;

use crate::error::AppError;

#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(AppError))]
pub struct AppJson<T>(pub T);

#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Path), rejection(AppError))]
pub struct AppPath<T>(pub T);

#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(AppError))]
pub struct AppQuery<T>(pub T);

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        debug!(status = %rejection.status(), "rejected JSON body");
        // serde appends every accepted enum name, aliases included.
        let text = rejection.body_text();
        let message = match text.split_once(", expected one of") {
            Some((head, _)) => head.to_string(),
            None => text,
        };
        AppError::Validation(message)
    }
}

impl From<PathRejection> for AppError {
    fn from(rejection: PathRejection) -> Self {
        debug!(status = %rejection.status(), "rejected path parameters");
        AppError::Validation(rejection.body_text())
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        AppError::Validation(rejection.body_text())
    }
}
