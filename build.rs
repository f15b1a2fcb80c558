//! Records the git commit and build time so /version can identify a
//! running controller.

use std::process::Command;

fn git_output(args: &[&str]) -> Option<String> {
    let output = Command::new("git").args(args).output().ok()?;
    if !output.status.success() {
        return None;
    }
    let value = String::from_utf8(output.stdout).ok()?;
    Some(value.trim().to_string())
}

fn main() {
    let short = git_output(&["rev-parse", "--short", "HEAD"]);
    let full = git_output(&["rev-parse", "HEAD"]);

    println!(
        "cargo:rustc-env=GIT_COMMIT_SHORT={}",
        short.unwrap_or_else(|| "unknown".to_string())
    );
    println!(
        "cargo:rustc-env=GIT_COMMIT_FULL={}",
        full.unwrap_or_else(|| "unknown".to_string())
    );
    println!(
        "cargo:rustc-env=BUILD_TIMESTAMP={}",
        chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ")
    );

    println!("cargo:rerun-if-changed=.git/HEAD");
    println!("cargo:rerun-if-changed=.git/refs/heads/");
}
