//! Channel resolution against an in-process channel server

use axum::Router;
use axum::extract::Path;
use axum::http::{StatusCode, header};
use axum::response::IntoResponse;
use axum::routing::get;
use node_planner::{VersionError, VersionResolver};
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

async fn serve(app: Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

fn channel_server(hits: Arc<AtomicU32>) -> Router {
    Router::new().route(
        "/channels/{channel}",
        get(move |Path(channel): Path<String>| {
            let hits = hits.clone();
            async move {
                hits.fetch_add(1, Ordering::SeqCst);
                match channel.as_str() {
                    "stable" => (
                        StatusCode::FOUND,
                        [(
                            header::LOCATION,
                            "https://github.com/k3s-io/k3s/releases/tag/v1.30.4+k3s1",
                        )],
                    )
                        .into_response(),
                    "relative" => (StatusCode::FOUND, [(header::LOCATION, "/releases/v1.29.8+k3s1/")])
                        .into_response(),
                    _ => StatusCode::NOT_FOUND.into_response(),
                }
            }
        }),
    )
}

fn resolver(addr: SocketAddr) -> VersionResolver {
    VersionResolver::with_channel_url_template(format!("http://{addr}/channels/{{channel}}")).unwrap()
}

#[tokio::test]
async fn test_channel_lookup_is_cached() {
    let hits = Arc::new(AtomicU32::new(0));
    let addr = serve(channel_server(hits.clone())).await;
    let versions = resolver(addr);

    let first = versions.resolve("stable").await.unwrap();
    assert_eq!(first, "v1.30.4+k3s1");
    assert_eq!(hits.load(Ordering::SeqCst), 1);

    let second = versions.resolve("stable").await.unwrap();
    assert_eq!(second, first);
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_empty_version_uses_stable_channel() {
    let hits = Arc::new(AtomicU32::new(0));
    let addr = serve(channel_server(hits.clone())).await;

    assert_eq!(resolver(addr).resolve("").await.unwrap(), "v1.30.4+k3s1");
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_relative_location_takes_last_segment() {
    let hits = Arc::new(AtomicU32::new(0));
    let addr = serve(channel_server(hits)).await;

    assert_eq!(resolver(addr).resolve("relative").await.unwrap(), "v1.29.8+k3s1");
}

#[tokio::test]
async fn test_concrete_version_skips_lookup() {
    let hits = Arc::new(AtomicU32::new(0));
    let addr = serve(channel_server(hits.clone())).await;

    assert_eq!(resolver(addr).resolve("v1.28.0+k3s1").await.unwrap(), "v1.28.0+k3s1");
    assert_eq!(hits.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_missing_location_is_an_error_and_not_cached() {
    let hits = Arc::new(AtomicU32::new(0));
    let addr = serve(channel_server(hits.clone())).await;
    let versions = resolver(addr);

    for _ in 0..2 {
        let err = versions.resolve("nightly").await.unwrap_err();
        assert!(matches!(err, VersionError::MissingLocation { status: 404, .. }));
    }
    assert_eq!(hits.load(Ordering::SeqCst), 2);
}
