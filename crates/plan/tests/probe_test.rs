//! Probe runner tests against an in-process HTTP server

use axum::Router;
use axum::http::StatusCode;
use axum::routing::get;
use bootstrap_plan::{HttpGetAction, Plan, Probe, ProbeError, run_probes};
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

async fn serve(app: Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

fn write_plan(dir: &Path, probes: Vec<(&str, String)>) -> std::path::PathBuf {
    let mut plan = Plan::default();
    for (name, url) in probes {
        plan.probes.insert(
            name.to_string(),
            Probe {
                timeout_seconds: 1,
                success_threshold: 1,
                failure_threshold: 1,
                http_get: HttpGetAction {
                    url,
                    ..Default::default()
                },
                ..Default::default()
            },
        );
    }
    let path = dir.join("plan.json");
    std::fs::write(&path, plan.to_json_pretty().unwrap()).unwrap();
    path
}

#[tokio::test]
async fn test_probes_return_once_all_healthy() {
    let hits = Arc::new(AtomicU32::new(0));
    let counter = hits.clone();
    let app = Router::new().route(
        "/healthz",
        get(move || {
            let counter = counter.clone();
            async move {
                // Unhealthy for the first two polls
                if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                    StatusCode::SERVICE_UNAVAILABLE
                } else {
                    StatusCode::OK
                }
            }
        }),
    );
    let addr = serve(app).await;

    let dir = tempfile::tempdir().unwrap();
    let plan_file = write_plan(dir.path(), vec![("kubelet", format!("http://{addr}/healthz"))]);

    run_probes(&plan_file, Duration::from_millis(10), &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(hits.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_probes_stop_on_cancellation() {
    let app = Router::new().route("/readyz", get(|| async { StatusCode::INTERNAL_SERVER_ERROR }));
    let addr = serve(app).await;

    let dir = tempfile::tempdir().unwrap();
    let plan_file = write_plan(dir.path(), vec![("kube-apiserver", format!("http://{addr}/readyz"))]);

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });

    let err = run_probes(&plan_file, Duration::from_millis(10), &cancel)
        .await
        .unwrap_err();
    assert!(matches!(err, ProbeError::Cancelled));
}

#[tokio::test]
async fn test_plan_without_probes_is_immediately_healthy() {
    let dir = tempfile::tempdir().unwrap();
    let plan_file = write_plan(dir.path(), vec![]);
    run_probes(&plan_file, Duration::from_secs(60), &CancellationToken::new())
        .await
        .unwrap();
}

#[tokio::test]
async fn test_missing_plan_file_is_reported_with_path() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("missing.json");
    let err = run_probes(&missing, Duration::from_millis(10), &CancellationToken::new())
        .await
        .unwrap_err();
    match err {
        ProbeError::Read { path, .. } => assert_eq!(path, missing),
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_health_check_waits_for_tls_material() {
    let hits = Arc::new(AtomicU32::new(0));
    let counter = hits.clone();
    let app = Router::new().route(
        "/readyz",
        get(move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                StatusCode::OK
            }
        }),
    );
    let addr = serve(app).await;

    let dir = tempfile::tempdir().unwrap();
    let ca_cert = dir.path().join("server-ca.crt");
    let mut plan = Plan::default();
    plan.probes.insert(
        "kube-apiserver".to_string(),
        Probe {
            timeout_seconds: 1,
            success_threshold: 1,
            failure_threshold: 1,
            http_get: HttpGetAction {
                url: format!("http://{addr}/readyz"),
                ca_cert: ca_cert.display().to_string(),
                ..Default::default()
            },
            ..Default::default()
        },
    );
    let plan_file = dir.path().join("plan.json");
    std::fs::write(&plan_file, plan.to_json_pretty().unwrap()).unwrap();

    // The runtime writes its CA bundle some time after probing starts.
    let late_ca = ca_cert.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        std::fs::write(late_ca, b"").unwrap();
    });

    let cancel = CancellationToken::new();
    let guard = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(5)).await;
        guard.cancel();
    });

    run_probes(&plan_file, Duration::from_millis(10), &cancel)
        .await
        .unwrap();
    assert!(ca_cert.exists());
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}
