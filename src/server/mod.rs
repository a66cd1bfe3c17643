//! Preview server rendering pages on request
//!
//! Post pages are cached for `revalidate_secs`; requests carrying a
//! `?preview=<ref>` query render draft content and skip the cache.

use anyhow::Result;
use axum::{
    body::Body,
    extract::{Path, Query, State},
    http::{header, Request, StatusCode},
    response::{Html, IntoResponse, Json, Response},
    routing::get,
    Router,
};
use serde::Deserialize;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::gateway::{ContentRef, GatewayError};
use crate::generator::{Generator, PostRender};
use crate::helpers::url_for;
use crate::Site;

struct CachedPage {
    html: String,
    rendered_at: Instant,
}

/// Server state
pub struct ServerState {
    generator: Generator,
    static_dir: PathBuf,
    api_endpoint: String,
    revalidate: Duration,
    cache: RwLock<HashMap<String, CachedPage>>,
}

impl ServerState {
    pub fn new(site: &Site, generator: Generator) -> Self {
        Self {
            generator,
            static_dir: site.static_dir.clone(),
            api_endpoint: url_for(&site.config, "api/posts?cursor="),
            revalidate: Duration::from_secs(site.config.revalidate_secs),
            cache: RwLock::new(HashMap::new()),
        }
    }

    async fn cached(&self, key: &str) -> Option<String> {
        let cache = self.cache.read().await;
        cache
            .get(key)
            .filter(|page| page.rendered_at.elapsed() < self.revalidate)
            .map(|page| page.html.clone())
    }

    async fn store(&self, key: &str, html: &str) {
        if self.revalidate.is_zero() {
            return;
        }
        let mut cache = self.cache.write().await;
        cache.insert(
            key.to_string(),
            CachedPage {
                html: html.to_string(),
                rendered_at: Instant::now(),
            },
        );
    }
}

#[derive(Debug, Default, Deserialize)]
struct PreviewParams {
    preview: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct CursorParams {
    cursor: Option<String>,
}

/// Build the application router
pub fn router(state: Arc<ServerState>) -> Router {
    Router::new()
        .route("/", get(index_handler))
        .route("/post/:uid", get(post_handler))
        .route("/post/:uid/", get(post_handler))
        .route("/api/posts", get(api_posts_handler))
        .route("/style.css", get(style_handler))
        .fallback(fallback_handler)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the preview server
pub async fn start(site: &Site, generator: Generator, ip: &str, port: u16) -> Result<()> {
    let state = Arc::new(ServerState::new(site, generator));
    let app = router(state);

    // Parse address - handle "localhost" specially
    let bind_ip = if ip == "localhost" { "127.0.0.1" } else { ip };
    let addr: SocketAddr = format!("{}:{}", bind_ip, port).parse()?;

    println!("Server running at http://{}:{}", ip, port);
    println!("Press Ctrl+C to stop.");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

async fn index_handler(State(state): State<Arc<ServerState>>) -> Response {
    if let Some(html) = state.cached("/").await {
        return Html(html).into_response();
    }
    match state.generator.render_index(Some(&state.api_endpoint)).await {
        Ok(html) => {
            state.store("/", &html).await;
            Html(html).into_response()
        }
        Err(e) => error_response(&state, e),
    }
}

async fn post_handler(
    State(state): State<Arc<ServerState>>,
    Path(uid): Path<String>,
    Query(params): Query<PreviewParams>,
) -> Response {
    let content_ref = match params.preview.filter(|p| !p.is_empty()) {
        Some(preview) => ContentRef::Preview(preview),
        None => ContentRef::Master,
    };
    let key = format!("post/{}", uid);

    if !content_ref.is_preview() {
        if let Some(html) = state.cached(&key).await {
            tracing::debug!("Serving cached {}", key);
            return Html(html).into_response();
        }
    }

    match state.generator.render_post(&uid, &content_ref).await {
        Ok(PostRender::Found(html)) => {
            if !content_ref.is_preview() {
                state.store(&key, &html).await;
            }
            Html(html).into_response()
        }
        Ok(PostRender::NotFound(uid)) => not_found_response(&state, Some(&uid)),
        Err(e) => error_response(&state, e),
    }
}

async fn api_posts_handler(
    State(state): State<Arc<ServerState>>,
    Query(params): Query<CursorParams>,
) -> Response {
    let cursor = params.cursor.unwrap_or_default();
    match state.generator.load_cards(&cursor).await {
        Ok(page) => Json(page).into_response(),
        Err(e) => {
            tracing::warn!("Failed to load more posts: {}", e);
            let status = match &e {
                GatewayError::ExhaustedCursor | GatewayError::InvalidCursor(_) => {
                    StatusCode::BAD_REQUEST
                }
                GatewayError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
                _ => StatusCode::BAD_GATEWAY,
            };
            let failure = e.load_failure();
            (
                status,
                Json(serde_json::json!({
                    "error": failure,
                    "message": failure.message(),
                })),
            )
                .into_response()
        }
    }
}

async fn style_handler(State(state): State<Arc<ServerState>>) -> Response {
    (
        [(header::CONTENT_TYPE, "text/css; charset=utf-8")],
        state.generator.stylesheet(),
    )
        .into_response()
}

/// Serve static files, rendering the not-found page for anything else
async fn fallback_handler(
    State(state): State<Arc<ServerState>>,
    request: Request<Body>,
) -> Response {
    if state.static_dir.is_dir() {
        let mut service = ServeDir::new(&state.static_dir);
        match service.try_call(request).await {
            Ok(response) if response.status() != StatusCode::NOT_FOUND => {
                return response.into_response();
            }
            Ok(_) => {}
            Err(e) => {
                tracing::warn!("Failed to serve static file: {}", e);
                return (StatusCode::INTERNAL_SERVER_ERROR, "Server error").into_response();
            }
        }
    }
    not_found_response(&state, None)
}

fn not_found_response(state: &ServerState, uid: Option<&str>) -> Response {
    match state.generator.render_not_found(uid) {
        Ok(html) => (StatusCode::NOT_FOUND, Html(html)).into_response(),
        Err(e) => {
            tracing::error!("Failed to render not-found page: {}", e);
            (StatusCode::NOT_FOUND, "Not found").into_response()
        }
    }
}

/// Gateway failures become 502 pages, anything else a 500
fn error_response(state: &ServerState, err: anyhow::Error) -> Response {
    let (status, message) = match err.downcast_ref::<GatewayError>() {
        Some(gateway_err) => (
            StatusCode::BAD_GATEWAY,
            gateway_err.load_failure().message(),
        ),
        None => (StatusCode::INTERNAL_SERVER_ERROR, "Something went wrong."),
    };
    tracing::error!("Request failed: {:#}", err);

    match state.generator.render_error(status.as_u16(), message) {
        Ok(html) => (status, Html(html)).into_response(),
        Err(_) => (status, message).into_response(),
    }
}
