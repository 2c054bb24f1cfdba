//! Package download: progress reporting and HTTP failures.

use std::time::Duration;

use inplace_updater::core::{UpdateError, UpdateRequest};
use inplace_updater::fetch::{DownloadProgress, PackageFetcher};
use inplace_updater::test_utils::snapshot_tree;
use inplace_updater::updater::Updater;
use reqwest::Url;
use tempfile::TempDir;

use crate::common::{PackageServer, Reply, TestInstall, test_config};

#[tokio::test]
async fn test_final_progress_reports_complete_download() {
    let body: Vec<u8> = (0..200_000u32).map(|i| (i % 251) as u8).collect();
    let server = PackageServer::start(Reply::Package(body.clone())).await;
    let temp = TempDir::new().unwrap();
    let dest = temp.path().join("package.zip");

    let fetcher = PackageFetcher::new(Duration::from_secs(30), Duration::ZERO).unwrap();
    let mut reports: Vec<DownloadProgress> = Vec::new();
    let url = Url::parse(&server.url()).unwrap();
    let bytes = fetcher.download(&url, &dest, |p| reports.push(*p)).await.unwrap();

    assert_eq!(bytes, body.len() as u64);
    assert_eq!(std::fs::read(&dest).unwrap(), body);

    let last = reports.last().expect("at least the final report");
    assert!(last.finished);
    assert_eq!(last.bytes_read, body.len() as u64);
    assert_eq!(last.total_bytes, Some(body.len() as u64));
    assert_eq!(last.percent(), Some(100.0));
    assert_eq!(reports.iter().filter(|p| p.finished).count(), 1);

    // Progress never goes backwards
    assert!(reports.windows(2).all(|w| w[0].bytes_read <= w[1].bytes_read));
}

#[tokio::test]
async fn test_unknown_length_reports_bytes_without_percent() {
    let body = vec![42u8; 50_000];
    let server = PackageServer::start(Reply::Unsized(body.clone())).await;
    let temp = TempDir::new().unwrap();
    let dest = temp.path().join("package.zip");

    let fetcher = PackageFetcher::new(Duration::from_secs(30), Duration::ZERO).unwrap();
    let mut reports: Vec<DownloadProgress> = Vec::new();
    let url = Url::parse(&server.url()).unwrap();
    let bytes = fetcher.download(&url, &dest, |p| reports.push(*p)).await.unwrap();

    assert_eq!(bytes, body.len() as u64);
    assert_eq!(std::fs::read(&dest).unwrap(), body);
    let last = reports.last().expect("at least the final report");
    assert!(last.finished);
    assert_eq!(last.bytes_read, body.len() as u64);
    assert_eq!(last.total_bytes, None);
    assert_eq!(last.percent(), None);
    assert!(reports.iter().all(|p| p.percent().is_none()));
}

#[tokio::test]
async fn test_stalled_server_times_out() {
    let server = PackageServer::start(Reply::Stall).await;
    let temp = TempDir::new().unwrap();

    let fetcher = PackageFetcher::new(Duration::from_secs(1), Duration::ZERO).unwrap();
    let url = Url::parse(&server.url()).unwrap();
    let err = fetcher.download(&url, &temp.path().join("p.zip"), |_| {}).await.unwrap_err();

    match err.downcast_ref::<UpdateError>() {
        Some(UpdateError::Timeout {
            timeout_secs,
            ..
        }) => assert_eq!(*timeout_secs, 1),
        other => panic!("expected a timeout, got {other:?}"),
    }
}

#[tokio::test]
async fn test_not_found_fails_without_touching_install() {
    let install = TestInstall::v1();
    let before = snapshot_tree(&install.install_dir);
    let server = PackageServer::start(Reply::NotFound).await;

    let request = UpdateRequest::new(&install.install_dir, &server.url()).unwrap();
    let err = Updater::new(test_config())
        .with_progress(false)
        .run(&request, &[])
        .await
        .unwrap_err();

    match err.downcast_ref::<UpdateError>() {
        Some(UpdateError::NetworkError {
            reason,
            ..
        }) => assert!(reason.contains("404"), "unexpected reason: {reason}"),
        other => panic!("expected a network error, got {other:?}"),
    }
    assert_eq!(snapshot_tree(&install.install_dir), before);
}

#[tokio::test]
async fn test_truncated_body_is_a_network_error() {
    let server = PackageServer::start(Reply::Truncated {
        body: vec![7u8; 10_000],
        claimed: 50_000,
    })
    .await;
    let temp = TempDir::new().unwrap();

    let fetcher = PackageFetcher::new(Duration::from_secs(30), Duration::ZERO).unwrap();
    let url = Url::parse(&server.url()).unwrap();
    let err = fetcher.download(&url, &temp.path().join("p.zip"), |_| {}).await.unwrap_err();

    assert!(
        matches!(err.downcast_ref::<UpdateError>(), Some(UpdateError::NetworkError { .. })),
        "unexpected error: {err:#}"
    );
}

#[tokio::test]
async fn test_unreachable_server_is_a_network_error() {
    // Bind then drop, so the port is very likely closed
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };
    let temp = TempDir::new().unwrap();

    let fetcher = PackageFetcher::new(Duration::from_secs(5), Duration::ZERO).unwrap();
    let url = Url::parse(&format!("http://127.0.0.1:{port}/package.zip")).unwrap();
    let err = fetcher.download(&url, &temp.path().join("p.zip"), |_| {}).await.unwrap_err();

    assert!(matches!(
        err.downcast_ref::<UpdateError>(),
        Some(UpdateError::NetworkError { .. } | UpdateError::Timeout { .. })
    ));
}
