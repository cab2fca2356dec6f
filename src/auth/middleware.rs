use std::sync::Arc;
use std::task::{Context, Poll};

use axum::body::Body;
use axum::http::{Request, header};
use axum::response::{IntoResponse, Response};
use base64::{Engine as _, engine::general_purpose};
use futures::future::BoxFuture;
use tower::{Layer, Service};
use tracing::debug;

use super::{AuthProvider, Owner};
use crate::errors::AppError;

/// Tower layer that resolves the caller to an [`Owner`] before any handler runs.
#[derive(Clone)]
pub struct AuthLayer {
    provider: Arc<AuthProvider>,
}

impl AuthLayer {
    pub fn new(provider: Arc<AuthProvider>) -> Self {
        Self { provider }
    }
}

impl<S> Layer<S> for AuthLayer {
    type Service = AuthMiddleware<S>;

    fn layer(&self, inner: S) -> Self::Service {
        AuthMiddleware {
            inner,
            provider: self.provider.clone(),
        }
    }
}

#[derive(Clone)]
pub struct AuthMiddleware<S> {
    inner: S,
    provider: Arc<AuthProvider>,
}

impl<S> Service<Request<Body>> for AuthMiddleware<S>
where
    S: Service<Request<Body>, Response = Response> + Clone + Send + 'static,
    S::Future: Send + 'static,
{
    type Response = Response;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request<Body>) -> Self::Future {
        let provider = self.provider.clone();
        let mut inner = self.inner.clone();

        Box::pin(async move {
            let Some(credentials) = req
                .headers()
                .get(header::AUTHORIZATION)
                .and_then(|v| v.to_str().ok())
                .map(str::to_owned)
            else {
                return Ok(unauthorized("missing authentication credentials"));
            };

            let owner = if let Some(token) = credentials.strip_prefix("Bearer ") {
                provider.verify_token(token.trim())
            } else if let Some(encoded) = credentials.strip_prefix("Basic ") {
                match decode_basic(encoded.trim()) {
                    Some((email, password)) => {
                        // argon2 verification is CPU bound
                        tokio::task::spawn_blocking(move || {
                            provider.verify_password(&email, &password)
                        })
                        .await
                        .ok()
                        .flatten()
                    }
                    None => None,
                }
            } else {
                None
            };

            match owner {
                Some(owner) => {
                    req.extensions_mut().insert(owner);
                    inner.call(req).await
                }
                None => {
                    debug!("rejected credentials");
                    Ok(unauthorized("invalid credentials"))
                }
            }
        })
    }
}

/// `base64(email:password)` -> `(email, password)`.
fn decode_basic(encoded: &str) -> Option<(String, String)> {
    let bytes = general_purpose::STANDARD.decode(encoded).ok()?;
    let text = String::from_utf8(bytes).ok()?;
    let (email, password) = text.split_once(':')?;
    Some((email.to_string(), password.to_string()))
}

fn unauthorized(message: &str) -> Response {
    AppError::unauthorized(message).into_response()
}
