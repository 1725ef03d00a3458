mod common;

use std::fs;
use std::sync::Mutex;

use revgate::agent::{SuggestionResult, SuggestionSource, TaskRequest};
use revgate::autofix::{AutofixEngine, RunIds, autofix_scope};
use revgate::config::Policy;
use revgate::gitio;

use common::{commit_all, setup_git_repo};

struct QueuedSource {
    responses: Mutex<Vec<Option<SuggestionResult>>>,
    requests: Mutex<u32>,
}

impl QueuedSource {
    fn new(responses: Vec<Option<SuggestionResult>>) -> Self {
        Self {
            responses: Mutex::new(responses),
            requests: Mutex::new(0),
        }
    }

    fn request_count(&self) -> u32 {
        *self.requests.lock().unwrap()
    }
}

impl SuggestionSource for QueuedSource {
    fn request(&self, _request: &TaskRequest) -> Option<SuggestionResult> {
        *self.requests.lock().unwrap() += 1;
        let mut responses = self.responses.lock().unwrap();
        if responses.is_empty() {
            None
        } else {
            responses.remove(0)
        }
    }
}

fn fast_policy() -> Policy {
    let mut policy = Policy::default();
    policy.autofix.retry_backoff_secs = 0;
    policy
}

fn patch_response(patch: &str) -> Option<SuggestionResult> {
    Some(SuggestionResult {
        apply_patch: Some(patch.to_string()),
        ..Default::default()
    })
}

const APP_PATCH: &str = "\
--- a/app.py
+++ b/app.py
@@ -1,2 +1,2 @@
-value = None
+value = 0
 print(value)
";

#[tokio::test]
async fn test_valid_patch_applies_on_first_attempt() {
    let repo = setup_git_repo();
    fs::write(repo.path().join("app.py"), "value = None\nprint(value)\n").unwrap();
    commit_all(repo.path(), "add app");

    let source = QueuedSource::new(vec![patch_response(APP_PATCH)]);
    let policy = fast_policy();
    let engine = AutofixEngine::new(&policy, Some(&source));
    let scope = autofix_scope(repo.path(), &policy);

    let report = engine.run(&scope, &RunIds::default()).await;
    assert!(report.applied);
    assert_eq!(report.attempts_used, 1);
    assert_eq!(report.files_changed, vec!["app.py"]);
    assert_eq!(report.change_summary, "app.py");
    assert_eq!(
        fs::read_to_string(repo.path().join("app.py")).unwrap(),
        "value = 0\nprint(value)\n"
    );
}

#[tokio::test]
async fn test_source_declared_files_win_over_touched_paths() {
    let repo = setup_git_repo();
    fs::write(repo.path().join("app.py"), "value = None\nprint(value)\n").unwrap();
    commit_all(repo.path(), "add app");

    let source = QueuedSource::new(vec![Some(SuggestionResult {
        apply_patch: Some(APP_PATCH.to_string()),
        files_changed: Some(vec!["app.py".to_string(), "helper.py".to_string()]),
        change_summary: Some("unused".to_string()),
        ..Default::default()
    })]);
    let policy = fast_policy();
    let engine = AutofixEngine::new(&policy, Some(&source));
    let scope = autofix_scope(repo.path(), &policy);

    let report = engine.run(&scope, &RunIds::default()).await;
    assert_eq!(report.files_changed, vec!["app.py", "helper.py"]);
}

#[tokio::test]
async fn test_scenario_c_disallowed_path_rejected_then_retried() {
    // A patch touching docs/readme.md with allowedExtensions={.py} is
    // rejected pre-apply; the loop continues to the next attempt.
    let repo = setup_git_repo();
    fs::write(repo.path().join("app.py"), "value = None\nprint(value)\n").unwrap();
    fs::create_dir_all(repo.path().join("docs")).unwrap();
    fs::write(repo.path().join("docs/readme.md"), "docs\n").unwrap();
    commit_all(repo.path(), "add files");

    let bad_patch = "\
--- a/docs/readme.md
+++ b/docs/readme.md
@@ -1 +1 @@
-docs
+patched docs
";
    let source = QueuedSource::new(vec![
        patch_response(bad_patch),
        patch_response(APP_PATCH),
    ]);
    let policy = fast_policy();
    let engine = AutofixEngine::new(&policy, Some(&source));
    let scope = autofix_scope(repo.path(), &policy);

    let report = engine.run(&scope, &RunIds::default()).await;
    assert!(report.applied);
    assert_eq!(report.attempts_used, 2);
    assert_eq!(source.request_count(), 2);
    // The rejected patch never touched the tree
    assert_eq!(
        fs::read_to_string(repo.path().join("docs/readme.md")).unwrap(),
        "docs\n"
    );
}

#[tokio::test]
async fn test_patch_atomicity_mixed_scope_leaves_tree_identical() {
    // Dry-run would succeed for the valid hunk, but the candidate also
    // touches a disallowed file; the whole candidate is discarded before
    // any write.
    let repo = setup_git_repo();
    fs::write(repo.path().join("app.py"), "value = None\nprint(value)\n").unwrap();
    fs::create_dir_all(repo.path().join("docs")).unwrap();
    fs::write(repo.path().join("docs/readme.md"), "docs\n").unwrap();
    commit_all(repo.path(), "add files");

    let mixed_patch = "\
--- a/app.py
+++ b/app.py
@@ -1,2 +1,2 @@
-value = None
+value = 0
 print(value)
--- a/docs/readme.md
+++ b/docs/readme.md
@@ -1 +1 @@
-docs
+patched docs
";
    let mut policy = fast_policy();
    policy.autofix.max_attempts = 1;
    let source = QueuedSource::new(vec![patch_response(mixed_patch)]);
    let engine = AutofixEngine::new(&policy, Some(&source));
    let scope = autofix_scope(repo.path(), &policy);

    let report = engine.run(&scope, &RunIds::default()).await;
    assert!(!report.applied);
    assert_eq!(
        fs::read_to_string(repo.path().join("app.py")).unwrap(),
        "value = None\nprint(value)\n"
    );
    assert_eq!(
        fs::read_to_string(repo.path().join("docs/readme.md")).unwrap(),
        "docs\n"
    );
}

#[tokio::test]
async fn test_stale_patch_fails_dry_run_and_falls_back() {
    let repo = setup_git_repo();
    // File content does not match the patch context
    fs::write(
        repo.path().join("app.py"),
        "something_else = 1  # TODO_AUTOFIX\n",
    )
    .unwrap();
    commit_all(repo.path(), "add app");

    let source = QueuedSource::new(vec![
        patch_response(APP_PATCH),
        patch_response(APP_PATCH),
        patch_response(APP_PATCH),
    ]);
    let policy = fast_policy();
    let engine = AutofixEngine::new(&policy, Some(&source));
    let scope = autofix_scope(repo.path(), &policy);

    let report = engine.run(&scope, &RunIds::default()).await;
    assert_eq!(report.attempts_used, 3);
    // Fallback marker rewrite still made progress
    assert!(report.applied);
    assert_eq!(report.files_changed, vec!["app.py"]);
    assert_eq!(
        fs::read_to_string(repo.path().join("app.py")).unwrap(),
        "something_else = 1  # DONE_AUTOFIX\n"
    );
}

#[test]
fn test_check_patch_is_non_mutating() {
    let repo = setup_git_repo();
    fs::write(repo.path().join("app.py"), "value = None\nprint(value)\n").unwrap();
    commit_all(repo.path(), "add app");

    assert!(gitio::check_patch(repo.path(), APP_PATCH));
    assert_eq!(
        fs::read_to_string(repo.path().join("app.py")).unwrap(),
        "value = None\nprint(value)\n"
    );
}

#[test]
fn test_apply_patch_all_hunks_land() {
    let repo = setup_git_repo();
    fs::write(repo.path().join("a.py"), "one\n").unwrap();
    fs::write(repo.path().join("b.py"), "two\n").unwrap();
    commit_all(repo.path(), "add files");

    let multi = "\
--- a/a.py
+++ b/a.py
@@ -1 +1 @@
-one
+ONE
--- a/b.py
+++ b/b.py
@@ -1 +1 @@
-two
+TWO
";
    assert!(gitio::apply_patch(repo.path(), multi));
    assert_eq!(fs::read_to_string(repo.path().join("a.py")).unwrap(), "ONE\n");
    assert_eq!(fs::read_to_string(repo.path().join("b.py")).unwrap(), "TWO\n");
}
