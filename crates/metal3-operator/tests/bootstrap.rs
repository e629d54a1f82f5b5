//! End-to-end bootstrap tests against a stubbed API server
//!
//! The client answers every request with a 404 Status, which is enough for
//! the manager to start all servers and controllers and then shut down
//! cleanly on cancellation.

use std::time::Duration;

use clap::Parser;
use kube::Client;
use tokio_util::sync::CancellationToken;

use metal3_common::Error;
use metal3_operator::bootstrap;
use metal3_operator::config::Flags;

fn stub_client() -> Client {
    let svc = tower::service_fn(|_req: http::Request<kube::client::Body>| async move {
        let resp = http::Response::builder()
            .status(404)
            .header("content-type", "application/json")
            .body(kube::client::Body::from(
                br#"{"kind":"Status","apiVersion":"v1","status":"Failure","reason":"NotFound","code":404}"#
                    .to_vec(),
            ))
            .unwrap();
        Ok::<_, std::convert::Infallible>(resp)
    });
    Client::new(svc, "default")
}

fn write_serving_certs(dir: &std::path::Path) {
    let certified =
        rcgen::generate_simple_self_signed(vec!["localhost".to_string()]).unwrap();
    std::fs::write(dir.join("tls.crt"), certified.cert.pem()).unwrap();
    std::fs::write(dir.join("tls.key"), certified.key_pair.serialize_pem()).unwrap();
}

fn flags(cert_dir: &std::path::Path, extra: &[&str]) -> Flags {
    let cert_dir = cert_dir.to_str().unwrap();
    let mut argv = vec![
        "metal3-operator",
        "--webhook-port",
        "0",
        "--webhook-cert-dir",
        cert_dir,
        "--metrics-bind-addr",
        "127.0.0.1:0",
        "--health-addr",
        "127.0.0.1:0",
    ];
    argv.extend(extra);
    Flags::parse_from(argv)
}

#[tokio::test]
async fn manager_starts_and_shuts_down_cleanly_on_cancellation() {
    let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();
    let dir = tempfile::tempdir().unwrap();
    write_serving_certs(dir.path());

    let config = flags(dir.path(), &[]).into_runtime_config().unwrap();
    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(300)).await;
            cancel.cancel();
        });
    }

    bootstrap::run(config, stub_client(), cancel).await.unwrap();
}

#[tokio::test]
async fn readiness_gate_reports_cancellation_while_waiting() {
    let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();
    let dir = tempfile::tempdir().unwrap();
    write_serving_certs(dir.path());

    // The stub never serves metal3.io, so the gate can only end via the token
    let config = flags(dir.path(), &["--wait-for-metal3-controller"])
        .into_runtime_config()
        .unwrap();
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = bootstrap::run(config, stub_client(), cancel).await.unwrap_err();
    assert!(matches!(err, Error::Cancelled { .. }));
}

#[tokio::test]
async fn missing_serving_certificate_is_a_setup_failure() {
    let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();
    let dir = tempfile::tempdir().unwrap();
    // No tls.crt / tls.key written

    let config = flags(dir.path(), &[]).into_runtime_config().unwrap();
    let cancel = CancellationToken::new();

    let err = bootstrap::run(config, stub_client(), cancel).await.unwrap_err();
    assert!(matches!(err, Error::WebhookTls { .. }));
}
