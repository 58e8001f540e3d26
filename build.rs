use std::process::Command;

fn main() {
    println!("cargo:rerun-if-changed=.git/HEAD");
    println!("cargo:rerun-if-changed=.git/refs");
    println!("cargo:rerun-if-changed=migrations");
    println!("cargo:rerun-if-env-changed=CREATOR_PILOT_BUILD_SHA");

    // Release tarballs have no .git; packagers pass the revision in.
    let git_sha = std::env::var("CREATOR_PILOT_BUILD_SHA")
        .ok()
        .map(|sha| sha.trim().to_string())
        .filter(|sha| !sha.is_empty())
        .or_else(head_sha)
        .unwrap_or_else(|| "dev".to_string());

    println!("cargo:rustc-env=CREATOR_PILOT_GIT_SHA={git_sha}");
}

fn head_sha() -> Option<String> {
    let output = Command::new("git")
        .args(["rev-parse", "--short=8", "HEAD"])
        .output()
        .ok()?;
    if !output.status.success() {
        return None;
    }
    let sha = String::from_utf8_lossy(&output.stdout).trim().to_string();
    (!sha.is_empty()).then_some(sha)
}
