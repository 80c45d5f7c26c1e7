//! Version information for the extsync CLI

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionInfo {
    pub version: String,

    /// Short commit SHA, when built from a git checkout
    pub commit: Option<String>,

    pub build_date: Option<String>,

    /// Target triple
    pub target: Option<String>,
}

impl VersionInfo {
    pub fn current() -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            commit: option_env!("EXTSYNC_GIT_SHA").map(String::from),
            build_date: option_env!("EXTSYNC_BUILD_DATE").map(String::from),
            target: option_env!("EXTSYNC_TARGET").map(String::from),
        }
    }

    /// `extsync 0.4.0 (abc1234) x86_64-unknown-linux-gnu`
    pub fn display(&self) -> String {
        let mut parts = vec![format!("extsync {}", self.version)];
        if let Some(commit) = &self.commit {
            parts.push(format!("({})", commit));
        }
        if let Some(target) = &self.target {
            parts.push(target.clone());
        }
        parts.join(" ")
    }
}

impl std::fmt::Display for VersionInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.display())
    }
}
