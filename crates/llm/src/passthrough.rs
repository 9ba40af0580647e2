//! Delegate-only passthrough: forwards bytes to a single fixed upstream, bypassing
//! the router and translator entirely.
//!
//! Mounted only when `config.proxy.anthropic.enabled` — intended for callers that want
//! to speak raw Anthropic Messages API wire format to Anthropic itself, without routing
//! or unified-type translation in between.

use std::{convert::Infallible, sync::Arc, task::Poll};

use axum::{
    Router,
    response::{IntoResponse as _, Response},
    routing::any_service,
};
use config::ProxyConfig;
use futures::future::BoxFuture;
use http::header;
use reqwest::{RequestBuilder, Url};
use tower::Service;

use crate::http_client::http_client;

const ANTHROPIC_BASE_URL: &str = "https://api.anthropic.com/";

/// Build the passthrough router, or `None` if no passthrough endpoint is enabled.
pub(crate) fn router(config: &ProxyConfig) -> Option<Router<()>> {
    if !config.anthropic.enabled {
        return None;
    }

    let forward = Forward(Arc::new(ForwardInner {
        base_path: config.anthropic.path.clone(),
        upstream_base_url: Url::parse(ANTHROPIC_BASE_URL).expect("built-in Anthropic base URL is valid"),
        client: http_client(),
    }));

    Some(Router::new().nest_service(&config.anthropic.path, any_service(forward)))
}

#[derive(Clone)]
struct Forward(Arc<ForwardInner>);

struct ForwardInner {
    base_path: String,
    upstream_base_url: Url,
    client: reqwest::Client,
}

impl Service<axum::extract::Request> for Forward {
    type Response = Response;
    type Error = Infallible;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, _cx: &mut std::task::Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, request: axum::extract::Request) -> Self::Future {
        let inner = self.0.clone();

        let path = request
            .uri()
            .path()
            .strip_prefix(&inner.base_path)
            .unwrap_or(request.uri().path());

        let mut url = match inner.upstream_base_url.join(path.strip_prefix('/').unwrap_or(path)) {
            Ok(url) => url,
            Err(err) => {
                return Box::pin(async move {
                    log::warn!("passthrough: invalid upstream path '{path}': {err}");
                    Ok((http::StatusCode::BAD_GATEWAY, "invalid upstream path").into_response())
                });
            }
        };
        url.set_query(request.uri().query());

        let method = request.method().clone();
        let headers = request.headers().clone();

        let fut = forward_headers(inner.client.request(method, url), &headers)
            .body(reqwest::Body::wrap_stream(request.into_body().into_data_stream()))
            .send();

        Box::pin(async move {
            let response = match fut.await {
                Ok(response) => http::Response::from(response).into_response(),
                Err(err) => {
                    log::error!("passthrough: upstream request failed: {err}");
                    (http::StatusCode::BAD_GATEWAY, "could not reach upstream").into_response()
                }
            };

            Ok(response)
        })
    }
}

/// Copy inbound headers onto the outbound request, dropping hop-by-hop headers that
/// don't survive a proxy boundary.
fn forward_headers(mut request: RequestBuilder, headers: &http::HeaderMap) -> RequestBuilder {
    const HOP_BY_HOP: &[header::HeaderName] = &[
        header::CONNECTION,
        header::PROXY_AUTHENTICATE,
        header::PROXY_AUTHORIZATION,
        header::TE,
        header::TRAILER,
        header::TRANSFER_ENCODING,
        header::UPGRADE,
        header::HOST,
    ];

    for (name, value) in headers.iter() {
        if HOP_BY_HOP.contains(name) || name.as_str().eq_ignore_ascii_case("keep-alive") {
            continue;
        }
        request = request.header(name, value);
    }

    request
}
