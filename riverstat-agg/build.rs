//! Stamps riverstat-agg with build identification
//!
//! `GIT_HASH` is the short commit, suffixed `-dirty` when the worktree has
//! uncommitted changes, or `unknown` outside a git checkout.

use std::process::Command;

/// Trimmed stdout of a successful git invocation
fn git(args: &[&str]) -> Option<String> {
    let output = Command::new("git").args(args).output().ok()?;
    if !output.status.success() {
        return None;
    }
    String::from_utf8(output.stdout)
        .ok()
        .map(|s| s.trim().to_string())
}

fn git_hash() -> String {
    let Some(hash) = git(&["rev-parse", "--short=8", "HEAD"]) else {
        return "unknown".to_string();
    };
    match git(&["status", "--porcelain", "--untracked-files=no"]) {
        Some(changes) if !changes.is_empty() => format!("{}-dirty", hash),
        _ => hash,
    }
}

fn main() {
    let stamps = [
        ("GIT_HASH", git_hash()),
        (
            "BUILD_TIMESTAMP",
            chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
        ),
        (
            "BUILD_PROFILE",
            std::env::var("PROFILE").unwrap_or_else(|_| "unknown".to_string()),
        ),
    ];

    // No rerun-if-changed lines: the stamps are refreshed on every build
    for (key, value) in stamps {
        println!("cargo:rustc-env={}={}", key, value);
    }
}
