//! In-memory S3-compatible object store for vault tests.
//!
//! Accepts path-style PUT/GET/HEAD for any bucket/key and ignores request
//! signatures — the vault client's SigV4 headers are simply not checked.

#![allow(dead_code)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::any;
use axum::Router;
use tokio::sync::RwLock;

type Objects = Arc<RwLock<HashMap<String, Vec<u8>>>>;

#[derive(Clone)]
struct S3State {
    objects: Objects,
    buckets: Arc<RwLock<HashMap<String, ()>>>,
}

/// Start the mock store; returns its address and the object map for
/// direct inspection or tampering.
pub async fn start() -> (SocketAddr, Objects) {
    let objects: Objects = Arc::new(RwLock::new(HashMap::new()));
    let state = S3State {
        objects: objects.clone(),
        buckets: Arc::new(RwLock::new(HashMap::new())),
    };

    let app = Router::new()
        .route("/{*path}", any(handle))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (addr, objects)
}

async fn handle(
    State(state): State<S3State>,
    Path(path): Path<String>,
    method: Method,
    body: Bytes,
) -> Response {
    let is_bucket_op = !path.contains('/');

    match method {
        Method::HEAD => {
            if is_bucket_op {
                let buckets = state.buckets.read().await;
                if buckets.contains_key(&path) {
                    StatusCode::OK.into_response()
                } else {
                    StatusCode::NOT_FOUND.into_response()
                }
            } else {
                let objects = state.objects.read().await;
                if objects.contains_key(&path) {
                    StatusCode::OK.into_response()
                } else {
                    StatusCode::NOT_FOUND.into_response()
                }
            }
        }
        Method::PUT => {
            if is_bucket_op {
                state.buckets.write().await.insert(path, ());
                StatusCode::OK.into_response()
            } else {
                state.objects.write().await.insert(path, body.to_vec());
                StatusCode::OK.into_response()
            }
        }
        Method::GET => {
            let objects = state.objects.read().await;
            match objects.get(&path) {
                Some(data) => (StatusCode::OK, data.clone()).into_response(),
                None => StatusCode::NOT_FOUND.into_response(),
            }
        }
        _ => StatusCode::METHOD_NOT_ALLOWED.into_response(),
    }
}
