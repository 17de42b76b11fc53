pub mod config;
pub mod db;

use std::collections::BTreeMap;
use std::future::Future;
use std::net::SocketAddr;

use axum::extract::Path;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Extension, Json, Router};
use rally_common::tree::StorePath;
use serde_json::{json, Value};
use tracing::{debug, info};

pub use crate::config::Config;
pub use crate::db::TreeDb;

pub type Result<T> = std::result::Result<T, AppError>;

pub struct AppError {
    status: StatusCode,
    error: anyhow::Error,
}

impl AppError {
    pub fn bad_request(error: impl Into<anyhow::Error>) -> Self {
        Self { status: StatusCode::BAD_REQUEST, error: error.into() }
    }
}

// Tell axum how to convert `AppError` into a response.
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            tracing::error!(error = %self.error, "request failed");
        }
        (self.status, format!("Something went wrong: {}", self.error)).into_response()
    }
}

// This enables using `?` on functions that return `Result<_, anyhow::Error>` to turn them into
// `Result<_, AppError>`. That way you don't need to do that manually.
impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self { status: StatusCode::INTERNAL_SERVER_ERROR, error: err.into() }
    }
}

#[derive(Clone)]
pub struct State {
    db: TreeDb,
}

impl State {
    pub fn new(db: TreeDb) -> Self {
        Self { db }
    }
    pub fn db(&self) -> &TreeDb {
        &self.db
    }
}

pub fn router(state: State) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/db", get(tree::read_root).put(tree::write_root).patch(tree::update).delete(tree::remove_root))
        .route("/db/*path", get(tree::read).put(tree::write).post(tree::push).delete(tree::remove))
        .layer(Extension(state))
}

/// Binds the listener now and hands back the address together with the serving future.
pub fn bind(
    addr: SocketAddr,
    state: State,
) -> anyhow::Result<(SocketAddr, impl Future<Output = anyhow::Result<()>>)> {
    let server = axum::Server::try_bind(&addr)?.serve(router(state).into_make_service());
    let local_addr = server.local_addr();
    info!(addr = %local_addr, "listening");
    Ok((local_addr, async move {
        server.await?;
        Ok::<_, anyhow::Error>(())
    }))
}

async fn health() -> &'static str {
    "ok"
}

fn parse_path(raw: &str) -> Result<StorePath> {
    StorePath::parse(raw).map_err(AppError::bad_request)
}

mod tree {
    use super::*;

    pub async fn read_root(Extension(state): Extension<State>) -> Result<impl IntoResponse> {
        debug!("tree::read_root");
        Ok(Json(state.db.read(&StorePath::root())?.unwrap_or(Value::Null)))
    }

    pub async fn write_root(Extension(state): Extension<State>, Json(payload): Json<Value>) -> Result<impl IntoResponse> {
        info!("tree::write_root");
        state.db.write(&StorePath::root(), payload)?;
        Ok(StatusCode::NO_CONTENT)
    }

    pub async fn update(
        Extension(state): Extension<State>,
        Json(payload): Json<BTreeMap<String, Value>>,
    ) -> Result<impl IntoResponse> {
        debug!(paths = payload.len(), "tree::update");
        let updates = payload
            .into_iter()
            .map(|(raw, value)| Ok((parse_path(&raw)?, value)))
            .collect::<Result<BTreeMap<_, _>>>()?;
        state.db.update(updates)?;
        Ok(StatusCode::NO_CONTENT)
    }

    pub async fn remove_root(Extension(state): Extension<State>) -> Result<impl IntoResponse> {
        info!("tree::remove_root");
        state.db.remove(&StorePath::root())?;
        Ok(StatusCode::NO_CONTENT)
    }

    pub async fn read(Extension(state): Extension<State>, Path(raw): Path<String>) -> Result<impl IntoResponse> {
        let path = parse_path(&raw)?;
        debug!(%path, "tree::read");
        Ok(Json(state.db.read(&path)?.unwrap_or(Value::Null)))
    }

    pub async fn write(
        Extension(state): Extension<State>,
        Path(raw): Path<String>,
        Json(payload): Json<Value>,
    ) -> Result<impl IntoResponse> {
        let path = parse_path(&raw)?;
        debug!(%path, "tree::write");
        state.db.write(&path, payload)?;
        Ok(StatusCode::NO_CONTENT)
    }

    pub async fn push(
        Extension(state): Extension<State>,
        Path(raw): Path<String>,
        Json(payload): Json<Value>,
    ) -> Result<impl IntoResponse> {
        let path = parse_path(&raw)?;
        let key = state.db.push(&path, payload)?;
        debug!(%path, %key, "tree::push");
        Ok(Json(json!({ "name": key })))
    }

    pub async fn remove(Extension(state): Extension<State>, Path(raw): Path<String>) -> Result<impl IntoResponse> {
        let path = parse_path(&raw)?;
        debug!(%path, "tree::remove");
        state.db.remove(&path)?;
        Ok(StatusCode::NO_CONTENT)
    }
}
