use std::collections::BTreeSet;
use std::io::Write;
use std::path::Path;
use std::process::{Command, Stdio};

use tracing::{debug, warn};

use crate::error::{Error, Result};

/// Marker appended when diff text is cut at the configured ceiling.
pub const DIFF_TRUNCATED_MARKER: &str = "\n...DIFF_TRUNCATED...";

/// Run git in `repo`, returning trimmed stdout or a `Git` error.
pub fn run_git(repo: &Path, args: &[&str]) -> Result<String> {
    let output = Command::new("git")
        .args(args)
        .current_dir(repo)
        .output()
        .map_err(|e| Error::Git(format!("failed to run git: {e}")))?;

    if output.status.success() {
        String::from_utf8(output.stdout)
            .map(|s| s.trim_end().to_string())
            .map_err(|e| Error::Git(format!("invalid utf8 from git: {e}")))
    } else {
        let stderr = String::from_utf8_lossy(&output.stderr);
        Err(Error::Git(format!("git {args:?} failed: {stderr}")))
    }
}

/// Files changed between two commits. Missing SHAs or a failing git
/// invocation yield an empty list, never an error — scope resolution
/// degrades, it does not abort.
pub fn changed_files(repo: &Path, base_sha: &str, head_sha: &str) -> Vec<String> {
    if base_sha.is_empty() || head_sha.is_empty() {
        return Vec::new();
    }
    match run_git(repo, &["diff", "--name-only", base_sha, head_sha]) {
        Ok(out) => out
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect(),
        Err(e) => {
            warn!(error = %e, "failed to list changed files");
            Vec::new()
        }
    }
}

/// Diff text between two commits, truncated at `max_chars` with a visible
/// marker. Failures yield an empty diff.
pub fn diff_text(repo: &Path, base_sha: &str, head_sha: &str, max_chars: usize) -> String {
    if base_sha.is_empty() || head_sha.is_empty() {
        return String::new();
    }
    match run_git(repo, &["diff", base_sha, head_sha]) {
        Ok(out) => truncate_diff(out, max_chars),
        Err(e) => {
            warn!(error = %e, "failed to capture diff");
            String::new()
        }
    }
}

/// Uncommitted diff of the working tree against HEAD (autofix context).
pub fn working_tree_diff(repo: &Path, max_chars: usize) -> String {
    match run_git(repo, &["diff", "HEAD"]) {
        Ok(out) => truncate_diff(out, max_chars),
        Err(e) => {
            warn!(error = %e, "failed to capture working tree diff");
            String::new()
        }
    }
}

pub fn truncate_diff(diff: String, max_chars: usize) -> String {
    if diff.chars().count() <= max_chars {
        return diff;
    }
    let cut: String = diff.chars().take(max_chars).collect();
    format!("{cut}{DIFF_TRUNCATED_MARKER}")
}

/// Extract the set of file paths a unified diff touches, from
/// `+++ b/<path>` and `--- a/<path>` headers. The `/dev/null` sentinel
/// (add/remove targets) is excluded.
pub fn patch_paths(patch: &str) -> BTreeSet<String> {
    let mut paths = BTreeSet::new();
    for line in patch.lines() {
        let path = if let Some(rest) = line.strip_prefix("+++ b/") {
            rest.trim()
        } else if let Some(rest) = line.strip_prefix("--- a/") {
            rest.trim()
        } else {
            continue;
        };
        if !path.is_empty() && path != "/dev/null" {
            paths.insert(path.to_string());
        }
    }
    paths
}

/// True when the path's extension (with leading dot) is in `allowed`.
pub fn has_allowed_extension(path: &str, allowed: &[String]) -> bool {
    Path::new(path)
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| allowed.iter().any(|a| a == &format!(".{ext}")))
}

fn git_apply(repo: &Path, patch: &str, check_only: bool) -> bool {
    let mut args = vec!["apply"];
    if check_only {
        args.push("--check");
    }
    args.push("--whitespace=nowarn");

    let mut child = match Command::new("git")
        .args(&args)
        .current_dir(repo)
        .stdin(Stdio::piped())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .spawn()
    {
        Ok(c) => c,
        Err(e) => {
            warn!(error = %e, "failed to spawn git apply");
            return false;
        }
    };

    if let Some(mut stdin) = child.stdin.take()
        && stdin.write_all(patch.as_bytes()).is_err()
    {
        // Fall through to wait; git reports the broken pipe as a failure
        debug!("failed writing patch to git apply stdin");
    }

    match child.wait_with_output() {
        Ok(output) => {
            if !output.status.success() {
                debug!(
                    check_only,
                    stderr = %String::from_utf8_lossy(&output.stderr),
                    "git apply rejected patch"
                );
            }
            output.status.success()
        }
        Err(e) => {
            warn!(error = %e, "git apply did not complete");
            false
        }
    }
}

/// Non-mutating check that a patch would apply cleanly to the tree.
pub fn check_patch(repo: &Path, patch: &str) -> bool {
    if patch.trim().is_empty() {
        return false;
    }
    git_apply(repo, patch, true)
}

/// Apply a patch to the tree. git applies all hunks or none, so a `true`
/// return means the whole candidate landed.
pub fn apply_patch(repo: &Path, patch: &str) -> bool {
    if patch.trim().is_empty() {
        return false;
    }
    git_apply(repo, patch, false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_patch_paths_from_headers() {
        let patch = "\
--- a/src/app.py
+++ b/src/app.py
@@ -1 +1 @@
-old
+new
--- a/docs/readme.md
+++ b/docs/readme.md
@@ -1 +1 @@
-x
+y
";
        let paths = patch_paths(patch);
        assert_eq!(paths.len(), 2);
        assert!(paths.contains("src/app.py"));
        assert!(paths.contains("docs/readme.md"));
    }

    #[test]
    fn test_patch_paths_excludes_dev_null() {
        let patch = "\
--- /dev/null
+++ b/new_file.py
@@ -0,0 +1 @@
+hello
--- a/gone.py
+++ /dev/null
@@ -1 +0,0 @@
-bye
";
        let paths = patch_paths(patch);
        assert_eq!(paths.len(), 2);
        assert!(paths.contains("new_file.py"));
        assert!(paths.contains("gone.py"));
        assert!(!paths.contains("/dev/null"));
    }

    #[test]
    fn test_patch_paths_empty_patch() {
        assert!(patch_paths("").is_empty());
        assert!(patch_paths("not a diff at all").is_empty());
    }

    #[test]
    fn test_truncate_diff_under_limit_untouched() {
        assert_eq!(truncate_diff("short".to_string(), 100), "short");
    }

    #[test]
    fn test_truncate_diff_over_limit_gets_marker() {
        let truncated = truncate_diff("x".repeat(50), 10);
        assert!(truncated.starts_with("xxxxxxxxxx"));
        assert!(truncated.ends_with(DIFF_TRUNCATED_MARKER));
        assert_eq!(truncated.len(), 10 + DIFF_TRUNCATED_MARKER.len());
    }

    #[test]
    fn test_has_allowed_extension() {
        let allowed = vec![".py".to_string(), ".rs".to_string()];
        assert!(has_allowed_extension("src/app.py", &allowed));
        assert!(has_allowed_extension("lib.rs", &allowed));
        assert!(!has_allowed_extension("docs/readme.md", &allowed));
        assert!(!has_allowed_extension("Makefile", &allowed));
        assert!(!has_allowed_extension("", &allowed));
    }

    #[test]
    fn test_changed_files_empty_shas() {
        assert!(changed_files(Path::new("."), "", "abc").is_empty());
        assert!(changed_files(Path::new("."), "abc", "").is_empty());
    }

    #[test]
    fn test_empty_patch_never_applies() {
        assert!(!check_patch(Path::new("."), ""));
        assert!(!apply_patch(Path::new("."), "   \n"));
    }
}
