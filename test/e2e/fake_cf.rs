//! End-to-end run against a scripted `cf` executable.
//!
//! A shell script stands in for the `cf` CLI and answers the Cloud
//! Controller queries the platform client makes; app routes point at a
//! local axum server. This exercises the real `CfPlatform` process and HTTP
//! plumbing without a Cloud Foundry target.
//!
//! ## Running
//!
//! ```bash
//! cargo test -p brats-e2e --test fake_cf
//! ```

#![cfg(unix)]

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use axum::{routing::get, Router};
use brats_platform::{CfConfig, CfPlatform};
use brats_poll::PollPolicy;
use brats_verify::{
    nodejs_scenarios, ErrorKind, Outcome, RunConfig, SuiteRunner, Timeouts, Verifier,
};
use tokio::net::TcpListener;

const FAKE_CF: &str = r#"#!/bin/sh
echo "$*" >> "$FAKE_CF_STATE/calls.log"
case "$1" in
  push)
    echo "Pushing app $2"
    if [ -n "$FAKE_CF_FAIL_PUSH" ]; then
      echo "Staging error: buildpack compile failed" >&2
      exit 1
    fi
    echo "-----> Supplying Dotnet Core"
    echo "   NodeJS 8.11.3: Contributing to layer"
    echo "-----> Installing node_modules"
    ;;
  app)
    echo "guid-$2"
    ;;
  curl)
    case "$2" in
      /v2/info) echo '{"api_version":"2.120.0"}' ;;
      */instances) echo '{"0":{"state":"RUNNING"}}' ;;
      */summary) printf '{"routes":[{"host":"","domain":{"name":"%s"}}]}\n' "$FAKE_APP_ADDR" ;;
      *) echo '{"error_code":"CF-NotFound","description":"unknown path"}' ;;
    esac
    ;;
  logs)
    echo "Retrieving logs for app $2"
    exec sleep 300
    ;;
  update-buildpack)
    if [ -n "$FAKE_CF_FAIL_UPDATE" ]; then
      echo "Stack not found" >&2
      exit 1
    fi
    ;;
  create-buildpack|delete-buildpack|delete)
    ;;
  *)
    echo "unknown command: $1" >&2
    exit 1
    ;;
esac
"#;

struct FakeCf {
    dir: tempfile::TempDir,
    buildpack: tempfile::TempDir,
    addr: SocketAddr,
}

impl FakeCf {
    async fn start() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("cf");
        std::fs::write(&script, FAKE_CF).unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let app = Router::new().route("/", get(|| async { "Hello World! dotnet: 2.1.403" }));
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            dir,
            buildpack: committed_buildpack(),
            addr,
        }
    }

    fn platform(&self, failures: &[&str]) -> CfPlatform {
        let mut envs = BTreeMap::from([
            ("FAKE_CF_STATE".to_string(), self.dir.path().display().to_string()),
            ("FAKE_APP_ADDR".to_string(), self.addr.to_string()),
        ]);
        for failure in failures {
            envs.insert(failure.to_string(), "1".to_string());
        }
        CfPlatform::new(CfConfig {
            cf_path: self.dir.path().join("cf"),
            app_scheme: "http".to_string(),
            skip_tls_verify: false,
            envs,
        })
        .unwrap()
    }

    fn calls(&self) -> Vec<String> {
        std::fs::read_to_string(self.dir.path().join("calls.log"))
            .unwrap_or_default()
            .lines()
            .map(str::to_string)
            .collect()
    }
}

/// A git repository with one commit, standing in for a buildpack checkout.
fn committed_buildpack() -> tempfile::TempDir {
    let repo = tempfile::tempdir().unwrap();
    std::fs::write(repo.path().join("manifest.yml"), "language: nodejs\n").unwrap();
    for args in [
        &["init", "-q"][..],
        &["add", "."][..],
        &["commit", "-q", "-m", "init"][..],
    ] {
        let status = std::process::Command::new("git")
            .args(args)
            .current_dir(repo.path())
            .env("GIT_AUTHOR_NAME", "brats")
            .env("GIT_AUTHOR_EMAIL", "brats@example.com")
            .env("GIT_COMMITTER_NAME", "brats")
            .env("GIT_COMMITTER_EMAIL", "brats@example.com")
            .status()
            .unwrap();
        assert!(status.success(), "git {args:?} failed");
    }
    repo
}

fn fixtures_dir() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("../../fixtures")
}

fn timeouts() -> Timeouts {
    Timeouts {
        instances: PollPolicy::new(Duration::from_millis(200), Duration::from_secs(30)),
        assertion: PollPolicy::new(Duration::from_millis(200), Duration::from_secs(5)),
    }
}

#[tokio::test]
async fn full_catalog_passes_against_fake_cf() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();

    let fake = FakeCf::start().await;
    let runner = SuiteRunner::new(
        Verifier::new(Arc::new(fake.platform(&[])), timeouts()),
        RunConfig {
            buildpack_dir: fake.buildpack.path().to_path_buf(),
            ..RunConfig::default()
        },
    );

    let scenarios = nodejs_scenarios(&fixtures_dir()).unwrap();
    let report = runner.run(&scenarios).await.unwrap();

    for scenario in &report.scenarios {
        assert_eq!(
            scenario.outcome,
            Outcome::Passed,
            "{} did not pass",
            scenario.name
        );
    }
    assert_eq!(report.passed(), 3);

    let calls = fake.calls();
    assert!(calls
        .iter()
        .any(|c| c.starts_with("create-buildpack unbuilt-v3-node_buildpack ")));
    assert!(!calls.iter().any(|c| c.starts_with("update-buildpack ")));
    assert!(calls
        .iter()
        .any(|c| c == "delete-buildpack -f unbuilt-v3-node_buildpack"));
    assert!(calls.iter().any(|c| c.contains("-b unbuilt-v3-node_buildpack")));
    assert!(calls.iter().any(|c| c.contains("-k 2G -m 2G")));

    let deletes = calls.iter().filter(|c| c.starts_with("delete -f -r ")).count();
    assert_eq!(deletes, 3);
}

#[tokio::test]
async fn buildpack_is_unregistered_when_push_fails() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();

    let fake = FakeCf::start().await;
    let runner = SuiteRunner::new(
        Verifier::new(Arc::new(fake.platform(&["FAKE_CF_FAIL_PUSH"])), timeouts()),
        RunConfig {
            selection: vec!["unbuilt-buildpack".to_string()],
            buildpack_dir: fake.buildpack.path().to_path_buf(),
            ..RunConfig::default()
        },
    );

    let scenarios = nodejs_scenarios(&fixtures_dir()).unwrap();
    let report = runner.run(&scenarios).await.unwrap();

    assert_eq!(report.scenarios.len(), 1);
    match &report.scenarios[0].outcome {
        Outcome::Failed { kind, message } => {
            assert_eq!(*kind, ErrorKind::Push);
            assert!(message.contains("buildpack compile failed"), "{message}");
        }
        other => panic!("unexpected outcome: {other:?}"),
    }

    let calls = fake.calls();
    assert!(calls
        .iter()
        .any(|c| c == "delete-buildpack -f unbuilt-v3-node_buildpack"));
    assert!(calls.iter().any(|c| c.starts_with("delete -f -r unbuilt-buildpack-")));
}

#[tokio::test]
async fn buildpack_is_unregistered_when_stack_update_fails() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();

    let fake = FakeCf::start().await;
    let runner = SuiteRunner::new(
        Verifier::new(Arc::new(fake.platform(&["FAKE_CF_FAIL_UPDATE"])), timeouts()),
        RunConfig {
            selection: vec!["unbuilt-buildpack".to_string()],
            buildpack_dir: fake.buildpack.path().to_path_buf(),
            stack: Some("bogus".to_string()),
            ..RunConfig::default()
        },
    );

    let scenarios = nodejs_scenarios(&fixtures_dir()).unwrap();
    let report = runner.run(&scenarios).await.unwrap();

    match &report.scenarios[0].outcome {
        Outcome::Failed { kind, message } => {
            assert_eq!(*kind, ErrorKind::Setup);
            assert!(message.contains("Stack not found"), "{message}");
        }
        other => panic!("unexpected outcome: {other:?}"),
    }

    let calls = fake.calls();
    assert!(calls
        .iter()
        .any(|c| c.starts_with("create-buildpack unbuilt-v3-node_buildpack ")));
    assert!(calls
        .iter()
        .any(|c| c.starts_with("update-buildpack unbuilt-v3-node_buildpack ") && c.ends_with("-s bogus")));
    assert!(calls
        .iter()
        .any(|c| c == "delete-buildpack -f unbuilt-v3-node_buildpack"));
    assert!(!calls.iter().any(|c| c.starts_with("push ")));
}
