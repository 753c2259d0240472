//! Extractors that report rejections as [`ApiError`] JSON bodies.

use axum::{
  extract::{FromRequest, FromRequestParts},
  http::request::Parts,
};
use serde::Deserialize;
use shard_core::store::Page;

use crate::error::ApiError;

/// JSON request body.
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(ApiError))]
pub struct JsonBody<T>(pub T);

/// Query string.
#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(ApiError))]
pub struct QueryParams<T>(pub T);

/// URL path parameters.
#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Path), rejection(ApiError))]
pub struct PathParam<T>(pub T);

/// The authenticated user, inserted into request extensions by the server's
/// auth layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller(pub String);

impl<S> FromRequestParts<S> for Caller
where
  S: Send + Sync,
{
  type Rejection = ApiError;

  async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
    parts
      .extensions
      .get::<Caller>()
      .cloned()
      .ok_or(ApiError::Unauthorized)
  }
}

/// `?page=&limit=`, both optional.
#[derive(Debug, Default, Deserialize)]
pub struct PageParams {
  pub page:  Option<u32>,
  pub limit: Option<u32>,
}

impl PageParams {
  pub fn page(&self) -> Result<Page, ApiError> {
    let default = Page::default();
    Ok(Page::new(
      self.page.unwrap_or(default.page),
      self.limit.unwrap_or(default.limit),
    )?)
  }
}
