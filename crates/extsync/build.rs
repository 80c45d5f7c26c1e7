//! Build script: stamps the binary with commit, date and target

fn main() {
    let now = chrono::Utc::now();
    println!("cargo:rustc-env=EXTSYNC_BUILD_DATE={}", now.format("%Y-%m-%d"));

    if let Ok(target) = std::env::var("TARGET") {
        println!("cargo:rustc-env=EXTSYNC_TARGET={}", target);
    }

    let sha = std::process::Command::new("git")
        .args(["rev-parse", "--short", "HEAD"])
        .output()
        .ok()
        .filter(|output| output.status.success())
        .map(|output| String::from_utf8_lossy(&output.stdout).trim().to_string());
    if let Some(sha) = sha.filter(|s| !s.is_empty()) {
        println!("cargo:rustc-env=EXTSYNC_GIT_SHA={}", sha);
    }

    println!("cargo:rerun-if-changed=.git/HEAD");
}
