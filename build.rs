// SPDX-License-Identifier: GPL-3.0-only

use std::process::Command;

fn main() {
    // Re-run build script if git HEAD changes
    println!("cargo::rerun-if-changed=.git/HEAD");
    println!("cargo::rerun-if-changed=.git/refs/tags");
    println!("cargo::rerun-if-env-changed=EDGEVIEWER_VERSION");

    // Packagers can pin the version string
    let version = match std::env::var("EDGEVIEWER_VERSION") {
        Ok(v) => v,
        Err(_) => git_version().unwrap_or_else(|| env!("CARGO_PKG_VERSION").to_string()),
    };

    println!("cargo::rustc-env=GIT_VERSION={}", version);
}

/// "0.1.0-abcdef1" for a tagged commit, "0.1.0-dirty-abcdef1" past a tag,
/// or the crate version with the short hash when there are no tags.
fn git_version() -> Option<String> {
    let hash = run_git(&["rev-parse", "--short", "HEAD"])?;

    let Some(described) = run_git(&["describe", "--tags", "--match", "v*"]) else {
        return Some(format!("{}-{}", env!("CARGO_PKG_VERSION"), hash));
    };
    let described = described.strip_prefix('v').unwrap_or(&described);

    let parts: Vec<&str> = described.rsplitn(3, '-').collect();
    if parts.len() == 3 {
        Some(format!("{}-dirty-{}", parts[2], hash))
    } else {
        Some(format!("{}-{}", described, hash))
    }
}

fn run_git(args: &[&str]) -> Option<String> {
    let output = Command::new("git").args(args).output().ok()?;
    if output.status.success() {
        Some(String::from_utf8_lossy(&output.stdout).trim().to_string())
    } else {
        None
    }
}
