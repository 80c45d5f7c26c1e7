//! Failure taxonomy for per-item operations
//!
//! Collaborators (registry client, editor CLI, direct installer) report
//! failures as an [`OperationError`] carrying a closed [`ErrorKind`]. The
//! retry chain switches on the kind; free-text inspection happens only once,
//! at the collaborator boundary, through [`OperationError::classify`].

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::LazyLock;

/// Kind of a per-item failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorKind {
    /// Connection refused, DNS failure, remote timeout, failed fetch
    Network,
    /// The per-attempt deadline enforced by the engine elapsed
    Timeout,
    /// The editor rejected or failed an install
    Install,
    /// The editor CLI itself misbehaved (spawn failure, crash, bad exit)
    Cli,
    /// The extension does not support the installed editor version
    Incompatible,
    /// Extension, version or file does not exist
    NotFound,
    /// Filesystem or registry refused access
    PermissionDenied,
    /// Malformed input (bad id, bad version, corrupt package)
    Validation,
    /// The operation was cancelled
    Cancelled,
    /// Anything else
    Other,
}

impl ErrorKind {
    /// Fatal kinds are never retried
    pub fn is_fatal(self) -> bool {
        matches!(
            self,
            ErrorKind::NotFound
                | ErrorKind::PermissionDenied
                | ErrorKind::Validation
                | ErrorKind::Cancelled
                | ErrorKind::Incompatible
        )
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::Network => "network",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Install => "install",
            ErrorKind::Cli => "cli",
            ErrorKind::Incompatible => "incompatible",
            ErrorKind::NotFound => "not-found",
            ErrorKind::PermissionDenied => "permission-denied",
            ErrorKind::Validation => "validation",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::Other => "other",
        };
        write!(f, "{}", s)
    }
}

/// A classified failure of one operation on one extension
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationError {
    pub kind: ErrorKind,
    pub message: String,
}

impl fmt::Display for OperationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for OperationError {}

// Checked in order against lowercased text; the first matching group wins.
// Short tokens are word-bounded so `client` is not `cli`.
const CLASSIFIER_PATTERNS: &[(ErrorKind, &[&str])] = &[
    (
        ErrorKind::Incompatible,
        &["not compatible", "requires newer version", "incompatible"],
    ),
    (ErrorKind::Cancelled, &["cancelled", "canceled"]),
    (
        ErrorKind::PermissionDenied,
        &["eacces", "eperm", "permission denied", "access is denied"],
    ),
    (
        ErrorKind::Network,
        &[
            "econnrefused",
            "econnreset",
            "enotfound",
            "eai_again",
            "etimedout",
            "connection refused",
            "connection reset",
            "socket hang up",
            "fetch failed",
            "getaddrinfo",
            r"\bdns\b",
            "network",
        ],
    ),
    (ErrorKind::Timeout, &["timed out", "timeout"]),
    (ErrorKind::NotFound, &["enoent", r"\b404\b", "not found"]),
    (
        ErrorKind::Validation,
        &["invalid", "malformed", "corrupt", "unexpected end of"],
    ),
    (ErrorKind::Install, &["install", "vsix"]),
    (ErrorKind::Cli, &[r"\bcli\b", "command failed", "exit code"]),
];

static CLASSIFIERS: LazyLock<Vec<(ErrorKind, Regex)>> = LazyLock::new(|| {
    CLASSIFIER_PATTERNS
        .iter()
        .map(|(kind, patterns)| {
            let re = Regex::new(&patterns.join("|")).expect("classifier patterns are valid");
            (*kind, re)
        })
        .collect()
});

impl OperationError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Network, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Timeout, message)
    }

    pub fn install(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Install, message)
    }

    pub fn cli(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Cli, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, message)
    }

    /// Build an incompatibility error, keeping only the human-readable reason
    pub fn incompatible(message: &str) -> Self {
        Self::new(ErrorKind::Incompatible, compatibility_reason(message))
    }

    /// Classify free text reported by an external tool
    pub fn classify(message: impl Into<String>) -> Self {
        let message = message.into();
        let lower = message.to_lowercase();

        let kind = CLASSIFIERS
            .iter()
            .find(|(_, pattern)| pattern.is_match(&lower))
            .map(|(kind, _)| *kind)
            .unwrap_or(ErrorKind::Other);

        if kind == ErrorKind::Incompatible {
            return Self::incompatible(&message);
        }

        Self { kind, message }
    }

    /// Same as [`classify`](Self::classify), but unrecognised text is
    /// attributed to `fallback` instead of [`ErrorKind::Other`]
    pub fn classify_or(message: impl Into<String>, fallback: ErrorKind) -> Self {
        let mut err = Self::classify(message);
        if err.kind == ErrorKind::Other {
            err.kind = fallback;
        }
        err
    }

    pub fn is_fatal(&self) -> bool {
        self.kind.is_fatal()
    }
}

/// Reduce an incompatibility message to its first line, cut at the first
/// ` at ` (start of a stack trace)
pub fn compatibility_reason(message: &str) -> String {
    let first_line = message.lines().next().unwrap_or_default();
    let reason = match first_line.find(" at ") {
        Some(idx) => &first_line[..idx],
        None => first_line,
    };
    reason.trim().trim_end_matches(['.', ':']).trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_network() {
        assert_eq!(
            OperationError::classify("connect ECONNREFUSED 127.0.0.1:443").kind,
            ErrorKind::Network
        );
        assert_eq!(
            OperationError::classify("getaddrinfo ENOTFOUND open-vsx.org").kind,
            ErrorKind::Network
        );
        assert_eq!(
            OperationError::classify("read ETIMEDOUT").kind,
            ErrorKind::Network
        );
    }

    #[test]
    fn test_classify_fatal_kinds() {
        assert_eq!(
            OperationError::classify("404 not found").kind,
            ErrorKind::NotFound
        );
        assert_eq!(
            OperationError::classify("EACCES: permission denied, mkdir").kind,
            ErrorKind::PermissionDenied
        );
        assert_eq!(
            OperationError::classify("Operation cancelled by user").kind,
            ErrorKind::Cancelled
        );
        assert!(OperationError::classify("ENOENT: no such file").is_fatal());
    }

    #[test]
    fn test_classify_install_and_other() {
        assert_eq!(
            OperationError::classify("Failed to install extension").kind,
            ErrorKind::Install
        );
        assert_eq!(
            OperationError::classify("something odd").kind,
            ErrorKind::Other
        );
        assert_eq!(
            OperationError::classify_or("something odd", ErrorKind::Cli).kind,
            ErrorKind::Cli
        );
    }

    #[test]
    fn test_classify_matches_short_tokens_as_words() {
        assert_eq!(
            OperationError::classify("HTTP client error (builder)").kind,
            ErrorKind::Other
        );
        assert_eq!(
            OperationError::classify("Code CLI exited abnormally").kind,
            ErrorKind::Cli
        );
        assert_eq!(
            OperationError::classify("dns lookup failed for open-vsx.org").kind,
            ErrorKind::Network
        );
        assert_eq!(
            OperationError::classify("unknown host in sendnsrequest").kind,
            ErrorKind::Other
        );
        assert_eq!(
            OperationError::classify("downloaded 14045 bytes").kind,
            ErrorKind::Other
        );
        assert_eq!(
            OperationError::classify_or("HTTP client error", ErrorKind::Network).kind,
            ErrorKind::Network
        );
    }

    #[test]
    fn test_incompatible_strips_stack() {
        let err = OperationError::classify(
            "Can't install: not compatible with version 1.70 at Object.install (main.js:1:2)\n    at next",
        );
        assert_eq!(err.kind, ErrorKind::Incompatible);
        assert_eq!(err.message, "Can't install: not compatible with version 1.70");
        assert!(err.is_fatal());
    }

    #[test]
    fn test_compatibility_reason_plain() {
        assert_eq!(
            compatibility_reason("not compatible with version 1.70"),
            "not compatible with version 1.70"
        );
    }

    #[test]
    fn test_timeout_is_not_fatal() {
        let err = OperationError::timeout("attempt 1 timed out after 100ms");
        assert!(!err.is_fatal());
        assert_eq!(err.kind, ErrorKind::Timeout);
    }
}
