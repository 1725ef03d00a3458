use std::path::{Path, PathBuf};

use tracing::warn;
use walkdir::WalkDir;

use crate::config::MAX_FILE_BYTES;
use crate::gitio::has_allowed_extension;

pub const TODO_SECURITY: &str = "TODO_SECURITY";
pub const FIXME_SECURITY: &str = "FIXME_SECURITY";
pub const TODO_AUTOFIX: &str = "TODO_AUTOFIX";
pub const FIXME_AUTOFIX: &str = "FIXME_AUTOFIX";
pub const NPLUS1: &str = "NPLUS1";

/// Closed substitution table for the fallback rewrite. Exact literal
/// matches only, never a fuzzy or pattern match.
pub const SUBSTITUTIONS: &[(&str, &str)] = &[
    (TODO_AUTOFIX, "DONE_AUTOFIX"),
    (FIXME_AUTOFIX, "DONE_AUTOFIX"),
    (TODO_SECURITY, "RESOLVED_SECURITY"),
];

/// Read a file as lines, skipping files over the byte ceiling, unreadable
/// files, and non-UTF-8 content. Returns an empty vec in all skip cases.
pub fn read_file_lines(path: &Path, max_bytes: u64) -> Vec<String> {
    let Ok(meta) = std::fs::metadata(path) else {
        return Vec::new();
    };
    if !meta.is_file() || meta.len() > max_bytes {
        return Vec::new();
    }
    match std::fs::read_to_string(path) {
        Ok(content) => content.lines().map(str::to_string).collect(),
        Err(_) => Vec::new(),
    }
}

/// 1-based line numbers on which `marker` occurs.
pub fn find_marker_lines(lines: &[String], marker: &str) -> Vec<u32> {
    lines
        .iter()
        .enumerate()
        .filter(|(_, line)| line.contains(marker))
        .map(|(idx, _)| (idx + 1) as u32)
        .collect()
}

/// Apply the substitution table to file content. Returns the rewritten
/// content only when something changed.
pub fn rewrite_markers(content: &str) -> Option<String> {
    let mut rewritten = content.to_string();
    for (from, to) in SUBSTITUTIONS {
        rewritten = rewritten.replace(from, to);
    }
    (rewritten != content).then_some(rewritten)
}

/// Rewrite markers in one file, all-or-nothing: the whole file is read,
/// all substitutions computed, and the whole file written back. Returns
/// whether the file changed.
pub fn rewrite_file(path: &Path) -> bool {
    let Ok(meta) = std::fs::metadata(path) else {
        return false;
    };
    if !meta.is_file() || meta.len() > MAX_FILE_BYTES {
        return false;
    }
    let Ok(content) = std::fs::read_to_string(path) else {
        return false;
    };
    match rewrite_markers(&content) {
        Some(rewritten) => match std::fs::write(path, rewritten) {
            Ok(()) => true,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to write rewritten file");
                false
            }
        },
        None => false,
    }
}

/// Walk `root` for files matching the allowed extensions, under the size
/// ceiling, skipping hidden directories (`.git` and friends).
pub fn eligible_files(root: &Path, allowed_extensions: &[String]) -> Vec<PathBuf> {
    WalkDir::new(root)
        .into_iter()
        .filter_entry(|e| {
            !(e.depth() > 0
                && e.file_name()
                    .to_str()
                    .is_some_and(|name| name.starts_with('.')))
        })
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter(|e| {
            e.path()
                .to_str()
                .is_some_and(|p| has_allowed_extension(p, allowed_extensions))
        })
        .filter(|e| e.metadata().is_ok_and(|m| m.len() <= MAX_FILE_BYTES))
        .map(|e| e.into_path())
        .collect()
}
