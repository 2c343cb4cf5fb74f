//! End-to-end healing scenarios against the in-memory hosting platform

use metamorph_agent::{CommandAgent, ScriptedAgent};
use metamorph_core::{AgentConfig, HealingRequest, MetamorphError, UploadOutcome};
use metamorph_github::MockHosting;
use metamorph_orchestrator::{
    HealingOutcome, HealingPipeline, HealingResponse, PipelineConfig, BRANCH_PREFIX,
};
use std::io::{Cursor, Write};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use zip::write::SimpleFileOptions;

const TOKEN: &str = "ghp_test";

fn widgets_archive() -> Vec<u8> {
    build_zip(&[
        ("acme-widgets-1a2b3c/src/a.go", "package a\n\nfunc A() {}\n"),
        ("acme-widgets-1a2b3c/src/b.go", "package b\n"),
        ("acme-widgets-1a2b3c/.github/ci.yml", "on: push\n"),
    ])
}

fn build_zip(files: &[(&str, &str)]) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default();
    for (name, content) in files {
        writer.start_file(*name, options).unwrap();
        writer.write_all(content.as_bytes()).unwrap();
    }
    writer.finish().unwrap().into_inner()
}

struct Harness {
    hosting: Arc<MockHosting>,
    agent: Arc<ScriptedAgent>,
    pipeline: HealingPipeline,
    _scratch: TempDir,
    work_root: std::path::PathBuf,
}

impl Harness {
    fn new(hosting: MockHosting, agent: ScriptedAgent) -> Self {
        Self::with_config(hosting, agent, |_| {})
    }

    fn with_config(
        hosting: MockHosting,
        agent: ScriptedAgent,
        tweak: impl FnOnce(&mut PipelineConfig),
    ) -> Self {
        let scratch = TempDir::new().unwrap();
        let work_root = scratch.path().join("work");

        let mut config = PipelineConfig {
            workspace_root: Some(work_root.clone()),
            ..PipelineConfig::default()
        };
        tweak(&mut config);

        let hosting = Arc::new(hosting);
        let agent = Arc::new(agent);
        let pipeline = HealingPipeline::new(hosting.clone(), agent.clone(), config);

        Self {
            hosting,
            agent,
            pipeline,
            _scratch: scratch,
            work_root,
        }
    }

    fn work_root_is_empty(&self) -> bool {
        dir_is_empty(&self.work_root)
    }
}

fn dir_is_empty(path: &Path) -> bool {
    match std::fs::read_dir(path) {
        Ok(mut entries) => entries.next().is_none(),
        Err(e) => e.kind() == std::io::ErrorKind::NotFound,
    }
}

fn request(token: Option<&str>) -> HealingRequest {
    HealingRequest::parse("acme/widgets", "fix null check", token.map(str::to_string)).unwrap()
}

#[tokio::test]
async fn test_widgets_scenario_opens_one_pull_request() {
    let harness = Harness::new(
        MockHosting::new()
            .with_archive(widgets_archive())
            .with_base_sha("base123")
            .with_existing_file("src/a.go", "blob-a"),
        ScriptedAgent::new()
            .write("src/a.go", "package a\n\nfunc A() { if x == nil { return } }\n")
            .write("src/b.go", "package b\n")
            .with_stdout("patched src/a.go"),
    );

    let outcome = harness.pipeline.heal(&request(Some(TOKEN))).await.unwrap();

    let HealingOutcome::Published { publication, removed, .. } = outcome else {
        panic!("expected a publication, got {outcome:?}");
    };
    assert!(publication.branch_name.starts_with(BRANCH_PREFIX));
    assert_eq!(publication.files_changed, vec!["src/a.go"]);
    assert!(publication.failed_uploads().is_empty());
    assert!(removed.is_empty());

    let branches = harness.hosting.branches();
    assert_eq!(branches.len(), 1);
    assert_eq!(branches[0].0, publication.branch_name);
    assert_eq!(branches[0].1, "base123");

    let uploads = harness.hosting.uploads();
    assert_eq!(uploads.len(), 1);
    assert_eq!(uploads[0].0, "src/a.go");
    assert_eq!(uploads[0].1.sha.as_deref(), Some("blob-a"));
    assert_eq!(uploads[0].1.branch, publication.branch_name);
    assert_eq!(
        uploads[0].1.decoded_content().as_deref(),
        Some("package a\n\nfunc A() { if x == nil { return } }\n")
    );

    let pulls = harness.hosting.pull_requests();
    assert_eq!(pulls.len(), 1);
    assert_eq!(pulls[0].head, publication.branch_name);
    assert_eq!(pulls[0].base, "main");
    assert!(pulls[0].body.contains("**Mission:** fix null check"));
    assert!(pulls[0].body.contains("- src/a.go"));
    assert!(!pulls[0].body.contains("src/b.go"));
    assert!(pulls[0].body.contains("patched src/a.go"));

    assert!(harness.work_root_is_empty());
}

#[tokio::test]
async fn test_untouched_repository_needs_no_changes() {
    let harness = Harness::new(
        MockHosting::new().with_archive(widgets_archive()),
        ScriptedAgent::new().write("src/b.go", "package b\n"),
    );

    let response = harness.pipeline.heal_to_response(&request(Some(TOKEN))).await;

    assert!(response.success);
    assert!(!response.changes_made);
    assert_eq!(response.message, "No changes needed");
    assert!(!harness.hosting.publication_attempted());
    assert!(harness.work_root_is_empty());
}

#[tokio::test]
async fn test_changes_without_token_are_not_published() {
    let harness = Harness::new(
        MockHosting::new().with_archive(widgets_archive()),
        ScriptedAgent::new().write("src/new.go", "package a\n"),
    );

    let response = harness.pipeline.heal_to_response(&request(None)).await;

    assert!(response.success);
    assert!(response.changes_made);
    assert_eq!(
        response.message,
        "Healing complete (changes made but no token to create PR)"
    );
    assert_eq!(response.pr_url, None);
    assert_eq!(response.files_changed, vec!["src/new.go"]);
    assert!(!harness.hosting.publication_attempted());
    assert_eq!(
        harness.hosting.calls(),
        vec!["download_archive acme/widgets@main auth=false"]
    );
}

#[tokio::test]
async fn test_missing_archive_is_download_failure() {
    let harness = Harness::new(
        MockHosting::new().with_archive_status(404),
        ScriptedAgent::new().write("src/a.go", "x"),
    );

    let err = harness.pipeline.heal(&request(Some(TOKEN))).await.unwrap_err();

    assert!(matches!(err, MetamorphError::DownloadFailed { status: 404 }));
    assert_eq!(harness.agent.run_count(), 0);
    assert!(harness.work_root_is_empty());

    let response = HealingResponse::from_error(&err);
    assert_eq!(response.status(), 400);
}

#[tokio::test]
async fn test_malformed_archive() {
    let harness = Harness::new(
        MockHosting::new().with_archive(b"definitely not a zip".to_vec()),
        ScriptedAgent::new(),
    );

    let err = harness.pipeline.heal(&request(Some(TOKEN))).await.unwrap_err();

    assert!(matches!(err, MetamorphError::MalformedArchive(_)));
    assert_eq!(harness.agent.run_count(), 0);
    assert!(harness.work_root_is_empty());
}

#[tokio::test]
async fn test_agent_timeout_skips_detection_and_publication() {
    let harness = Harness::with_config(
        MockHosting::new().with_archive(widgets_archive()),
        ScriptedAgent::new()
            .write("src/a.go", "changed")
            .with_delay(Duration::from_secs(5)),
        |config| config.agent_timeout = Duration::from_millis(50),
    );

    let response = harness.pipeline.heal_to_response(&request(Some(TOKEN))).await;

    assert!(!response.success);
    assert_eq!(response.status(), 408);
    assert_eq!(response.error_kind.as_deref(), Some("agent_timeout"));
    assert!(!harness.hosting.publication_attempted());
    assert!(harness.work_root_is_empty());
}

#[tokio::test]
async fn test_failed_upload_still_opens_pull_request() {
    let harness = Harness::new(
        MockHosting::new()
            .with_archive(widgets_archive())
            .failing_upload("src/a.go"),
        ScriptedAgent::new()
            .write("src/a.go", "package a // fixed\n")
            .write("src/c.go", "package c\n"),
    );

    let response = harness.pipeline.heal_to_response(&request(Some(TOKEN))).await;

    assert!(response.success);
    assert_eq!(response.message, "Healing complete, PR created");
    assert_eq!(response.files_changed, vec!["src/a.go", "src/c.go"]);
    assert_eq!(response.failed_uploads, vec!["src/a.go"]);
    assert_eq!(response.pr_number, Some(1));
    assert_eq!(
        response.pr_url.as_deref(),
        Some("https://github.com/acme/widgets/pull/1")
    );

    let uploaded: Vec<String> = harness
        .hosting
        .uploads()
        .into_iter()
        .map(|(path, _)| path)
        .collect();
    assert_eq!(uploaded, vec!["src/c.go"]);
    // Both paths are still listed in the description
    let pulls = harness.hosting.pull_requests();
    assert!(pulls[0].body.contains("- src/a.go"));
    assert!(pulls[0].body.contains("- src/c.go"));
}

#[tokio::test]
async fn test_failed_content_lookup_still_opens_pull_request() {
    let harness = Harness::new(
        MockHosting::new()
            .with_archive(widgets_archive())
            .failing_lookup("src/a.go"),
        ScriptedAgent::new()
            .write("src/a.go", "package a // fixed\n")
            .write("src/c.go", "package c\n"),
    );

    let outcome = harness.pipeline.heal(&request(Some(TOKEN))).await.unwrap();

    let HealingOutcome::Published { publication, .. } = outcome else {
        panic!("expected a publication, got {outcome:?}");
    };
    assert_eq!(publication.files_changed, vec!["src/a.go", "src/c.go"]);
    assert_eq!(publication.failed_uploads(), vec!["src/a.go"]);
    match &publication.uploads[0].outcome {
        UploadOutcome::Failed(reason) => assert!(reason.contains("500"), "{reason}"),
        other => panic!("unexpected outcome: {other:?}"),
    }

    // The file whose lookup failed is never uploaded
    let uploaded: Vec<String> = harness
        .hosting
        .uploads()
        .into_iter()
        .map(|(path, _)| path)
        .collect();
    assert_eq!(uploaded, vec!["src/c.go"]);
    assert_eq!(harness.hosting.pull_requests().len(), 1);
}

#[tokio::test]
async fn test_pull_request_failure_is_publication_error() {
    let harness = Harness::new(
        MockHosting::new()
            .with_archive(widgets_archive())
            .failing_pull(422, r#"{"message":"Validation Failed"}"#),
        ScriptedAgent::new().write("src/a.go", "fixed"),
    );

    let err = harness.pipeline.heal(&request(Some(TOKEN))).await.unwrap_err();

    match &err {
        MetamorphError::Publication(msg) => assert!(msg.contains("Validation Failed")),
        other => panic!("unexpected error: {other:?}"),
    }
    // The branch and upload stay on the remote
    assert_eq!(harness.hosting.branches().len(), 1);
    assert_eq!(harness.hosting.uploads().len(), 1);
    assert_eq!(HealingResponse::from_error(&err).status(), 500);
    assert!(harness.work_root_is_empty());
}

#[tokio::test]
async fn test_missing_api_key_fails_before_download() {
    let scratch = TempDir::new().unwrap();
    let hosting = Arc::new(MockHosting::new().with_archive(widgets_archive()));
    let agent = CommandAgent::from_config(&AgentConfig {
        api_key_env: "METAMORPH_PIPELINE_TEST_KEY_NEVER_SET".to_string(),
        ..AgentConfig::default()
    });
    let pipeline = HealingPipeline::new(
        hosting.clone(),
        Arc::new(agent),
        PipelineConfig {
            workspace_root: Some(scratch.path().join("work")),
            ..PipelineConfig::default()
        },
    );

    let response = pipeline.heal_to_response(&request(Some(TOKEN))).await;

    assert!(!response.success);
    assert_eq!(response.status(), 500);
    assert_eq!(response.error_kind.as_deref(), Some("configuration_error"));
    assert!(hosting.calls().is_empty());
    assert!(dir_is_empty(&scratch.path().join("work")));
}

#[tokio::test]
async fn test_required_token_is_enforced() {
    let harness = Harness::with_config(
        MockHosting::new().with_archive(widgets_archive()),
        ScriptedAgent::new(),
        |config| config.require_token = true,
    );

    let response = harness.pipeline.heal_to_response(&request(None)).await;

    assert_eq!(response.status(), 401);
    assert_eq!(response.error_kind.as_deref(), Some("authorization_error"));
    assert!(harness.hosting.calls().is_empty());
    assert_eq!(harness.agent.run_count(), 0);
}

#[tokio::test]
async fn test_hidden_files_are_ignored() {
    let harness = Harness::new(
        MockHosting::new().with_archive(widgets_archive()),
        ScriptedAgent::new()
            .write(".github/ci.yml", "on: pull_request\n")
            .write(".env", "SECRET=1\n")
            .write("src/.cache/state", "dirty\n"),
    );

    let outcome = harness.pipeline.heal(&request(Some(TOKEN))).await.unwrap();

    assert!(matches!(outcome, HealingOutcome::NoChanges { .. }));
    assert!(!harness.hosting.publication_attempted());
}

#[tokio::test]
async fn test_deletions_are_reported_but_not_published() {
    let harness = Harness::new(
        MockHosting::new().with_archive(widgets_archive()),
        ScriptedAgent::new()
            .remove("src/b.go")
            .write("src/a.go", "package a // fixed\n"),
    );

    let response = harness.pipeline.heal_to_response(&request(Some(TOKEN))).await;

    assert!(response.success);
    assert_eq!(response.files_changed, vec!["src/a.go"]);
    assert_eq!(response.files_removed, vec!["src/b.go"]);

    let uploaded: Vec<String> = harness
        .hosting
        .uploads()
        .into_iter()
        .map(|(path, _)| path)
        .collect();
    assert_eq!(uploaded, vec!["src/a.go"]);
}

#[tokio::test]
async fn test_only_deletions_count_as_no_changes() {
    let harness = Harness::new(
        MockHosting::new().with_archive(widgets_archive()),
        ScriptedAgent::new().remove("src/b.go"),
    );

    let response = harness.pipeline.heal_to_response(&request(Some(TOKEN))).await;

    assert!(!response.changes_made);
    assert_eq!(response.files_removed, vec!["src/b.go"]);
    assert!(!harness.hosting.publication_attempted());
}

#[tokio::test]
async fn test_concurrent_runs_get_distinct_branches() {
    let harness = Harness::new(
        MockHosting::new().with_archive(widgets_archive()),
        ScriptedAgent::new().write("src/a.go", "fixed"),
    );
    let pipeline = Arc::new(harness.pipeline);

    let a = tokio::spawn({
        let pipeline = pipeline.clone();
        async move { pipeline.heal(&request(Some(TOKEN))).await }
    });
    let b = tokio::spawn({
        let pipeline = pipeline.clone();
        async move { pipeline.heal(&request(Some(TOKEN))).await }
    });
    a.await.unwrap().unwrap();
    b.await.unwrap().unwrap();

    let branches = harness.hosting.branches();
    assert_eq!(branches.len(), 2);
    assert_ne!(branches[0].0, branches[1].0);
}

#[tokio::test]
async fn test_flush_delivers_final_dashboard_status() {
    use axum::{extract::State, routing::post, Json, Router};
    use metamorph_orchestrator::{Notifier, DASHBOARD_URL_ENV};
    use std::sync::Mutex;

    type Seen = Arc<Mutex<Vec<String>>>;
    let seen = Seen::default();
    let app = Router::new()
        .route(
            "/hook",
            post(
                |State(seen): State<Seen>, Json(body): Json<serde_json::Value>| async move {
                    let status = body["status"].as_str().unwrap_or_default().to_string();
                    seen.lock().unwrap().push(status);
                    "ok"
                },
            ),
        )
        .with_state(seen.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    // Only this test touches the dashboard variable in this binary
    std::env::set_var(DASHBOARD_URL_ENV, format!("http://{addr}/hook"));
    let harness = Harness::new(
        MockHosting::new().with_archive(widgets_archive()),
        ScriptedAgent::new(),
    );
    let pipeline = harness.pipeline.with_notifier(Notifier::from_env());

    let response = pipeline.heal_to_response(&request(None)).await;
    pipeline.notifier().flush(Duration::from_secs(5)).await;
    std::env::remove_var(DASHBOARD_URL_ENV);

    assert!(response.success);
    let mut seen = seen.lock().unwrap().clone();
    seen.sort();
    assert_eq!(seen, vec!["ANALYZING", "NO_CHANGES"]);
}
