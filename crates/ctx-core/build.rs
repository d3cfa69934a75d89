use std::process::Command;

/// Trimmed stdout of a successful git invocation.
fn git(args: &[&str]) -> Option<String> {
    let output = Command::new("git").args(args).output().ok()?;
    if !output.status.success() {
        return None;
    }
    String::from_utf8(output.stdout)
        .ok()
        .map(|s| s.trim().to_string())
}

fn main() {
    // packagers building from a tarball can pin the hash
    let hash = std::env::var("CTX_GIT_HASH").ok().or_else(|| {
        let hash = git(&["rev-parse", "--short", "HEAD"])?;
        let dirty = git(&["status", "--porcelain", "--untracked-files=no"])
            .is_some_and(|status| !status.is_empty());
        Some(if dirty { format!("{hash}-dirty") } else { hash })
    });
    println!(
        "cargo:rustc-env=CTX_GIT_HASH={}",
        hash.as_deref().unwrap_or("unknown")
    );

    let profile = std::env::var("PROFILE").unwrap_or_else(|_| "unknown".to_string());
    println!("cargo:rustc-env=CTX_BUILD_PROFILE={profile}");

    println!("cargo:rerun-if-env-changed=CTX_GIT_HASH");
    println!("cargo:rerun-if-changed=../../.git/HEAD");
    println!("cargo:rerun-if-changed=../../.git/index");
}
