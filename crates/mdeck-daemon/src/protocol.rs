//! Install/push line grammar for mirroring process output
//!
//! When a file is dropped onto a mirroring window the process logs the
//! transaction across several independent lines, e.g.
//!
//! ```text
//! INFO: Request to install /tmp/app.apk
//! adb: failed to install /tmp/app.apk: Failure [INSTALL_FAILED_INSUFFICIENT_STORAGE]
//! ERROR: Failed to install /tmp/app.apk
//! ```
//!
//! This module only classifies single lines; correlation lives in the
//! transaction tracker.

use std::sync::LazyLock;

use mdeck_core::ParsedEvent;
use regex::{Captures, Regex};

/// A pattern and the constructor for the event it recognises.
struct LinePattern {
    regex: Regex,
    build: fn(&Captures<'_>) -> ParsedEvent,
}

fn pattern(re: &str, build: fn(&Captures<'_>) -> ParsedEvent) -> LinePattern {
    LinePattern {
        regex: Regex::new(re).expect("Invalid log line pattern"),
        build,
    }
}

fn capture(caps: &Captures<'_>, index: usize) -> String {
    caps.get(index)
        .map(|m| m.as_str().to_string())
        .unwrap_or_default()
}

fn optional_capture(caps: &Captures<'_>, index: usize) -> Option<String> {
    caps.get(index)
        .map(|m| m.as_str().trim())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Ordered grammar. Each pattern is anchored on a distinguishing literal
/// prefix, so at most one can match a given line.
static LINE_PATTERNS: LazyLock<Vec<LinePattern>> = LazyLock::new(|| {
    vec![
        pattern(r"^INFO: Request to install (.+)$", |c| {
            ParsedEvent::InstallRequested {
                path: capture(c, 1),
            }
        }),
        pattern(r"^INFO: (.+) successfully installed$", |c| {
            ParsedEvent::InstallSucceeded {
                path: capture(c, 1),
            }
        }),
        pattern(r"^ERROR: Failed to install (.+)$", |c| {
            ParsedEvent::InstallFailed {
                path: capture(c, 1),
            }
        }),
        pattern(r"^adb: failed to install (.+?)(?:: (.*))?$", |c| {
            ParsedEvent::AdbInstallFailed {
                path: capture(c, 1),
                detail: optional_capture(c, 2),
            }
        }),
        pattern(r"^INFO: Request to push (.+)$", |c| ParsedEvent::PushRequested {
            path: capture(c, 1),
        }),
        pattern(r"^INFO: (.+) successfully pushed to (.+)$", |c| {
            ParsedEvent::PushSucceeded {
                path: capture(c, 1),
                dest: capture(c, 2),
            }
        }),
        pattern(r"^ERROR: Failed to push (.+)$", |c| ParsedEvent::PushFailed {
            path: capture(c, 1),
        }),
        pattern(r"^adb: failed to push (.+?)(?:: (.*))?$", |c| {
            ParsedEvent::AdbPushFailed {
                path: capture(c, 1),
                detail: optional_capture(c, 2),
            }
        }),
    ]
});

/// Classify one line of mirroring process output.
///
/// The line is trimmed before matching. Returns `None` for lines outside
/// the install/push grammar, which is the common case and not an error.
/// Pure function: safe to call from any task.
pub fn parse_log_line(line: &str) -> Option<ParsedEvent> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return None;
    }

    LINE_PATTERNS.iter().find_map(|p| {
        p.regex
            .captures(trimmed)
            .map(|caps| (p.build)(&caps))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_install_request() {
        assert_eq!(
            parse_log_line("INFO: Request to install /a.apk"),
            Some(ParsedEvent::InstallRequested {
                path: "/a.apk".to_string()
            })
        );
    }

    #[test]
    fn test_install_success() {
        assert_eq!(
            parse_log_line("INFO: /a.apk successfully installed"),
            Some(ParsedEvent::InstallSucceeded {
                path: "/a.apk".to_string()
            })
        );
    }

    #[test]
    fn test_install_failure() {
        assert_eq!(
            parse_log_line("ERROR: Failed to install /a.apk"),
            Some(ParsedEvent::InstallFailed {
                path: "/a.apk".to_string()
            })
        );
    }

    #[test]
    fn test_adb_install_failure_with_detail() {
        assert_eq!(
            parse_log_line("adb: failed to install /a.apk: INSTALL_FAILED_INSUFFICIENT_STORAGE"),
            Some(ParsedEvent::AdbInstallFailed {
                path: "/a.apk".to_string(),
                detail: Some("INSTALL_FAILED_INSUFFICIENT_STORAGE".to_string()),
            })
        );
    }

    #[test]
    fn test_adb_install_failure_without_detail() {
        assert_eq!(
            parse_log_line("adb: failed to install /a.apk"),
            Some(ParsedEvent::AdbInstallFailed {
                path: "/a.apk".to_string(),
                detail: None,
            })
        );
    }

    #[test]
    fn test_adb_failure_detail_keeps_inner_colons() {
        let parsed = parse_log_line(
            "adb: failed to install /tmp/app.apk: Failure [INSTALL_FAILED_VERSION_DOWNGRADE: Downgrade detected]",
        );
        assert_eq!(
            parsed,
            Some(ParsedEvent::AdbInstallFailed {
                path: "/tmp/app.apk".to_string(),
                detail: Some(
                    "Failure [INSTALL_FAILED_VERSION_DOWNGRADE: Downgrade detected]".to_string()
                ),
            })
        );
    }

    #[test]
    fn test_windows_path_survives() {
        assert_eq!(
            parse_log_line(r"INFO: Request to install C:\Users\me\app.apk"),
            Some(ParsedEvent::InstallRequested {
                path: r"C:\Users\me\app.apk".to_string()
            })
        );
    }

    #[test]
    fn test_push_lines() {
        assert_eq!(
            parse_log_line("INFO: Request to push /notes.txt"),
            Some(ParsedEvent::PushRequested {
                path: "/notes.txt".to_string()
            })
        );
        assert_eq!(
            parse_log_line("INFO: /notes.txt successfully pushed to /sdcard/Download/"),
            Some(ParsedEvent::PushSucceeded {
                path: "/notes.txt".to_string(),
                dest: "/sdcard/Download/".to_string(),
            })
        );
        assert_eq!(
            parse_log_line("ERROR: Failed to push /notes.txt"),
            Some(ParsedEvent::PushFailed {
                path: "/notes.txt".to_string()
            })
        );
        assert_eq!(
            parse_log_line("adb: failed to push /notes.txt: No space left on device"),
            Some(ParsedEvent::AdbPushFailed {
                path: "/notes.txt".to_string(),
                detail: Some("No space left on device".to_string()),
            })
        );
    }

    #[test]
    fn test_surrounding_whitespace_is_trimmed() {
        assert_eq!(
            parse_log_line("   INFO: /a.apk successfully installed \r\n"),
            Some(ParsedEvent::InstallSucceeded {
                path: "/a.apk".to_string()
            })
        );
    }

    #[test]
    fn test_matching_is_case_sensitive() {
        assert_eq!(parse_log_line("info: Request to install /a.apk"), None);
        assert_eq!(parse_log_line("ERROR: failed to install /a.apk"), None);
    }

    #[test]
    fn test_unrelated_lines_are_ignored() {
        assert_eq!(parse_log_line(""), None);
        assert_eq!(parse_log_line("INFO: Renderer: opengl"), None);
        assert_eq!(parse_log_line("INFO: Texture: 1080x2400"), None);
        assert_eq!(parse_log_line("scrcpy 2.4 <https://github.com/Genymobile/scrcpy>"), None);
        assert_eq!(parse_log_line("INFO: Request to install"), None);
    }
}
