// tests/fetch_integration.rs

//! Integration tests for concurrent wheel fetching.
//!
//! These tests verify that:
//! 1. One failing download does not stop its siblings
//! 2. Cached wheels with a matching digest are not downloaded again
//! 3. Stale or corrupt downloads are detected by digest
//! 4. Groups keep their shape through fetching

mod common;

use common::{TestServer, record};
use rezpip::hash::sha256;
use rezpip::{Error, FetchOptions, Fetcher, PackageGroup};
use std::collections::HashMap;
use std::fs;
use std::time::Duration;
use tempfile::TempDir;

fn quiet_fetcher() -> Fetcher {
    Fetcher::new(FetchOptions {
        timeout: Duration::from_secs(10),
        show_progress: false,
        ..Default::default()
    })
    .unwrap()
}

fn served<B: AsRef<[u8]>>(files: &[(&str, B)]) -> TestServer {
    TestServer::start(
        files
            .iter()
            .map(|(path, body)| (path.to_string(), body.as_ref().to_vec()))
            .collect::<HashMap<_, _>>(),
    )
}

#[test]
fn test_partial_failure_keeps_successful_downloads() {
    let server = served(&[("/a-1.0-py3-none-any.whl", b"wheel a"), ("/b-1.0-py3-none-any.whl", b"wheel b")]);
    let dest = TempDir::new().unwrap();

    let groups = vec![
        PackageGroup::new(vec![record("a", "1.0", &server.url("/a-1.0-py3-none-any.whl"), None)]),
        PackageGroup::new(vec![record("b", "1.0", &server.url("/b-1.0-py3-none-any.whl"), None)]),
        PackageGroup::new(vec![record("c", "1.0", &server.url("/c-1.0-py3-none-any.whl"), None)]),
    ];

    let err = quiet_fetcher().fetch(groups, dest.path()).unwrap_err();
    match err {
        Error::DownloadsFailed { failed, total } => {
            assert_eq!(failed, 1);
            assert_eq!(total, 3);
        }
        other => panic!("unexpected error: {other}"),
    }

    assert_eq!(fs::read(dest.path().join("a-1.0-py3-none-any.whl")).unwrap(), b"wheel a");
    assert_eq!(fs::read(dest.path().join("b-1.0-py3-none-any.whl")).unwrap(), b"wheel b");
    assert!(!dest.path().join("c-1.0-py3-none-any.whl").exists());
    assert!(!dest.path().join("c-1.0-py3-none-any.whl.part").exists());
}

#[test]
fn test_verified_cache_is_reused() {
    let server = served(&[("/a-1.0-py3-none-any.whl", b"fresh")]);
    let dest = TempDir::new().unwrap();
    let cached = dest.path().join("a-1.0-py3-none-any.whl");
    fs::write(&cached, b"cached").unwrap();

    let groups = vec![PackageGroup::new(vec![record(
        "a",
        "1.0",
        &server.url("/a-1.0-py3-none-any.whl"),
        Some(sha256(b"cached")),
    )])];

    let fetched = quiet_fetcher().fetch(groups, dest.path()).unwrap();
    assert_eq!(fetched[0].records()[0].path(), cached.as_path());
    assert_eq!(fs::read(&cached).unwrap(), b"cached");
    assert_eq!(server.request_count(), 0);
}

#[test]
fn test_stale_cache_is_replaced() {
    let server = served(&[("/a-1.0-py3-none-any.whl", b"fresh")]);
    let dest = TempDir::new().unwrap();
    let cached = dest.path().join("a-1.0-py3-none-any.whl");
    fs::write(&cached, b"truncated").unwrap();

    let groups = vec![PackageGroup::new(vec![record(
        "a",
        "1.0",
        &server.url("/a-1.0-py3-none-any.whl"),
        Some(sha256(b"fresh")),
    )])];

    quiet_fetcher().fetch(groups, dest.path()).unwrap();
    assert_eq!(fs::read(&cached).unwrap(), b"fresh");
    assert_eq!(server.request_count(), 1);
}

#[test]
fn test_corrupt_download_fails_its_unit() {
    let server = served(&[("/a-1.0-py3-none-any.whl", b"corrupt")]);
    let dest = TempDir::new().unwrap();

    let groups = vec![PackageGroup::new(vec![record(
        "a",
        "1.0",
        &server.url("/a-1.0-py3-none-any.whl"),
        Some(sha256(b"expected")),
    )])];

    let err = quiet_fetcher().fetch(groups, dest.path()).unwrap_err();
    assert!(matches!(err, Error::DownloadsFailed { failed: 1, total: 1 }));
    assert!(!dest.path().join("a-1.0-py3-none-any.whl").exists());
}

#[test]
fn test_group_shape_is_preserved() {
    let server = served(&[
        ("/a-1.0-py3-none-any.whl", b"a"),
        ("/b-1.0-py3-none-any.whl", b"b"),
        ("/c-1.0-py3-none-any.whl", b"c"),
    ]);
    let dest = TempDir::new().unwrap();

    let groups = vec![
        PackageGroup::new(vec![
            record("a", "1.0", &server.url("/a-1.0-py3-none-any.whl"), None),
            record("b", "1.0", &server.url("/b-1.0-py3-none-any.whl"), None),
        ]),
        PackageGroup::new(vec![record("c", "1.0", &server.url("/c-1.0-py3-none-any.whl"), None)]),
    ];

    let fetched = quiet_fetcher().fetch(groups, dest.path()).unwrap();
    let shape: Vec<Vec<&str>> = fetched.iter().map(|g| g.names()).collect();
    assert_eq!(shape, vec![vec!["a", "b"], vec!["c"]]);
    for group in &fetched {
        for artifact in group.records() {
            assert!(artifact.path().starts_with(dest.path()));
            assert!(artifact.path().is_file());
        }
    }
}
