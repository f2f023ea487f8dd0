use std::process::Command;

/// Short commit hash of the working tree, or `GIT_SHA` when git is absent
fn git_sha() -> Option<String> {
    let from_git = Command::new("git")
        .args(["rev-parse", "--short", "HEAD"])
        .output()
        .ok()
        .filter(|output| output.status.success())
        .map(|output| String::from_utf8_lossy(&output.stdout).trim().to_string());
    from_git
        .or_else(|| std::env::var("GIT_SHA").ok())
        .filter(|sha| !sha.is_empty())
}

fn main() {
    let base = env!("CARGO_PKG_VERSION");
    let version = match git_sha() {
        Some(sha) => format!("{}+{}", base, sha),
        None => base.to_string(),
    };
    println!("cargo:rustc-env=APP_VERSION={}", version);

    println!("cargo:rerun-if-env-changed=GIT_SHA");
    println!("cargo:rerun-if-changed=.git/HEAD");
}
