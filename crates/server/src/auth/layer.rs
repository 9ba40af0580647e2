use std::{
    fmt::Display,
    future::Future,
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
};

use axum::body::Body;
use context::Authentication;
use http::{HeaderValue, Request, Response, StatusCode, header::AUTHORIZATION};
use serde::Serialize;
use tower::Layer;

use crate::auth::{error::AuthError, principal_lookup::PrincipalLookup};

const API_KEY_HEADER: &str = "x-api-key";

/// Tower layer that authenticates every request via a `PrincipalLookup`, unless
/// `auth_disabled` is set, in which case every request is the synthetic admin.
#[derive(Clone)]
pub struct AuthLayer {
    lookup: Arc<dyn PrincipalLookup>,
    auth_disabled: bool,
}

impl AuthLayer {
    /// Build a new layer backed by the given lookup implementation.
    pub fn new(lookup: Arc<dyn PrincipalLookup>, auth_disabled: bool) -> Self {
        Self { lookup, auth_disabled }
    }
}

impl<Service> Layer<Service> for AuthLayer
where
    Service: Send + Clone,
{
    type Service = AuthService<Service>;

    fn layer(&self, next: Service) -> Self::Service {
        AuthService {
            next,
            layer: self.clone(),
        }
    }
}

#[derive(Clone)]
pub struct AuthService<Service> {
    next: Service,
    layer: AuthLayer,
}

impl<Service, ReqBody> tower::Service<Request<ReqBody>> for AuthService<Service>
where
    Service: tower::Service<Request<ReqBody>, Response = Response<Body>> + Send + Clone + 'static,
    Service::Future: Send,
    Service::Error: Display + 'static,
    ReqBody: http_body::Body + Send + 'static,
{
    type Response = http::Response<Body>;
    type Error = Service::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Response<Body>, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.next.poll_ready(cx)
    }

    fn call(&mut self, req: Request<ReqBody>) -> Self::Future {
        let mut next = self.next.clone();
        let layer = self.layer.clone();

        Box::pin(async move {
            let (mut parts, body) = req.into_parts();

            if layer.auth_disabled {
                parts.extensions.insert(Authentication {
                    principal: Some(context::Principal::synthetic_admin()),
                    has_passthrough_authorization: parts.headers.contains_key(AUTHORIZATION),
                });

                return next.call(Request::from_parts(parts, body)).await;
            }

            let token = extract_token(&parts);

            match token {
                Some(token) => match layer.lookup.lookup(&token).await {
                    Ok(principal) => {
                        parts.extensions.insert(Authentication {
                            principal: Some(principal),
                            has_passthrough_authorization: true,
                        });

                        next.call(Request::from_parts(parts, body)).await
                    }
                    Err(err) => Ok(error_response(err)),
                },
                None => Ok(error_response(AuthError::Unauthorized)),
            }
        })
    }
}

fn extract_token(parts: &http::request::Parts) -> Option<String> {
    if let Some(value) = parts.headers.get(API_KEY_HEADER)
        && let Ok(value) = value.to_str()
    {
        return Some(value.to_string());
    }

    let value = parts.headers.get(AUTHORIZATION)?.to_str().ok()?;
    let rest = value.strip_prefix("Bearer ").or_else(|| value.strip_prefix("bearer "))?;

    if rest.is_empty() { None } else { Some(rest.to_string()) }
}

fn error_response(err: AuthError) -> http::Response<Body> {
    #[derive(Serialize)]
    struct ErrorResponse {
        error: String,
    }

    let status = match err {
        AuthError::Unauthorized => StatusCode::UNAUTHORIZED,
        AuthError::Forbidden => StatusCode::FORBIDDEN,
        AuthError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    };

    let body = ErrorResponse { error: err.to_string() };

    Response::builder()
        .status(status)
        .header("WWW-Authenticate", HeaderValue::from_static("Bearer"))
        .header("Content-Type", "application/json")
        .body(Body::from(
            serde_json::to_string(&body).unwrap_or_else(|_| r#"{"error":"internal_error"}"#.to_string()),
        ))
        .unwrap()
}
