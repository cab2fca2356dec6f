//! HTTP handlers for `/v1/fragments`. Every handler runs behind the auth
//! layer, so an [`Owner`] is always present in the request extensions.

use crate::{
    auth::Owner,
    errors::AppError,
    handlers::envelope::success,
    models::fragment::FragmentError,
    services::fragment_service::Conversion,
    state::AppState,
};
use axum::{
    Extension,
    body::Body,
    extract::{Path, Query, State},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use serde::Deserialize;
use serde_json::json;

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub expand: Option<String>,
}

impl ListQuery {
    fn expanded(&self) -> bool {
        matches!(self.expand.as_deref(), Some("1" | "true"))
    }
}

/// GET `/v1/fragments[?expand=1]`
pub async fn list_fragments(
    State(state): State<AppState>,
    Extension(owner): Extension<Owner>,
    Query(q): Query<ListQuery>,
) -> Result<impl IntoResponse, AppError> {
    let fragments = state.fragments.by_user(owner.id(), q.expanded()).await?;
    Ok(success(json!({ "fragments": fragments })))
}

/// GET `/v1/fragments/{id}[.ext]` — raw payload, or converted when an
/// extension is present.
pub async fn get_fragment(
    State(state): State<AppState>,
    Extension(owner): Extension<Owner>,
    Path(raw_id): Path<String>,
) -> Result<Response, AppError> {
    let (id, ext) = split_extension(&raw_id);
    let service = &state.fragments;
    let fragment = service.by_id(owner.id(), id).await?;
    let data = service.get_data(&fragment).await?;

    let Some(ext) = ext else {
        return Ok(payload_response(fragment.content_type(), data));
    };
    match service.convert_to(&fragment, data, ext).await? {
        Conversion::Converted { data, mime } => {
            let content_type = if mime.starts_with("text/") {
                format!("{}; charset=utf-8", mime)
            } else {
                mime
            };
            Ok(payload_response(&content_type, data))
        }
        Conversion::Unsupported => Err(FragmentError::UnsupportedConversion {
            from: fragment.mime_type(),
            ext: ext.to_string(),
        }
        .into()),
    }
}

/// GET `/v1/fragments/{id}/info`
pub async fn get_fragment_info(
    State(state): State<AppState>,
    Extension(owner): Extension<Owner>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let fragment = state.fragments.by_id(owner.id(), &id).await?;
    Ok(success(json!({ "fragment": fragment })))
}

/// POST `/v1/fragments`
pub async fn create_fragment(
    State(state): State<AppState>,
    Extension(owner): Extension<Owner>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, AppError> {
    let content_type = request_content_type(&headers)
        .filter(|t| state.fragments.types().is_supported(t))
        .ok_or_else(|| AppError::unsupported_media_type("This type is not supported"))?;

    let fragment = state
        .fragments
        .create(owner.id(), content_type, body)
        .await?;

    let mut response = (
        StatusCode::CREATED,
        success(json!({ "fragment": fragment })),
    )
        .into_response();
    set_location(response.headers_mut(), &state.fragment_url(fragment.id()));
    Ok(response)
}

/// PUT `/v1/fragments/{id}` — replace the payload; the type is fixed.
pub async fn update_fragment(
    State(state): State<AppState>,
    Extension(owner): Extension<Owner>,
    Path(id): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, AppError> {
    let content_type = request_content_type(&headers).unwrap_or_default();
    let fragment = state
        .fragments
        .update_data(owner.id(), &id, content_type, body)
        .await
        .map_err(|err| match err {
            FragmentError::ImmutableType { .. } => AppError::new(
                StatusCode::BAD_REQUEST,
                "Type should not be changed after creation",
            ),
            other => other.into(),
        })?;

    let mut response = success(json!({ "fragment": fragment })).into_response();
    set_location(response.headers_mut(), &state.fragment_url(fragment.id()));
    Ok(response)
}

/// DELETE `/v1/fragments/{id}`
pub async fn delete_fragment(
    State(state): State<AppState>,
    Extension(owner): Extension<Owner>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    state.fragments.delete(owner.id(), &id).await?;
    Ok(success(json!({})))
}

/// `abc.html` -> (`abc`, Some(`html`)); `abc` -> (`abc`, None).
fn split_extension(raw: &str) -> (&str, Option<&str>) {
    match raw.split_once('.') {
        Some((id, ext)) if !ext.is_empty() => (id, Some(ext)),
        Some((id, _)) => (id, None),
        None => (raw, None),
    }
}

fn request_content_type(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
}

fn payload_response(content_type: &str, data: Bytes) -> Response {
    let mut response = Response::new(Body::from(data));
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_str(content_type)
            .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream")),
    );
    response
}

fn set_location(headers: &mut HeaderMap, url: &str) {
    if let Ok(value) = HeaderValue::from_str(url) {
        headers.insert(header::LOCATION, value);
    }
}
