//! Managed-block handling.
//!
//! Generated config lives between a BEGIN and END marker. Everything outside the
//! markers belongs to the operator and is carried over verbatim when configs are
//! regenerated with `preserve_config`.
use crate::constants::MANAGED_LABEL;
use crate::types::errors::{Result, SwapError};

#[must_use]
pub fn begin_marker(comment: &str) -> String {
    format!("{comment} BEGIN {MANAGED_LABEL}")
}

#[must_use]
pub fn end_marker(comment: &str) -> String {
    format!("{comment} END {MANAGED_LABEL}")
}

/// Wrap generated `body` in managed-block markers.
#[must_use]
pub fn wrap(comment: &str, body: &str) -> String {
    let mut out = String::with_capacity(body.len() + 96);
    out.push_str(&begin_marker(comment));
    out.push('\n');
    out.push_str(body.trim_end_matches('\n'));
    out.push('\n');
    out.push_str(&end_marker(comment));
    out.push('\n');
    out
}

/// Return the operator-owned lines of `existing`: everything outside the managed block,
/// with leading and trailing blank lines trimmed. A file without markers is entirely
/// operator-owned.
///
/// # Errors
///
/// Returns `SwapError::ConfigTranslation` for an unterminated or nested managed block.
pub fn extract_custom(existing: &str, comment: &str) -> Result<String> {
    let begin = begin_marker(comment);
    let end = end_marker(comment);
    let mut inside = false;
    let mut kept: Vec<&str> = Vec::new();
    for line in existing.lines() {
        let t = line.trim();
        if t == begin {
            if inside {
                return Err(SwapError::ConfigTranslation("nested managed block".into()));
            }
            inside = true;
            continue;
        }
        if t == end {
            if !inside {
                return Err(SwapError::ConfigTranslation(
                    "managed block end without begin".into(),
                ));
            }
            inside = false;
            continue;
        }
        if !inside {
            kept.push(line);
        }
    }
    if inside {
        return Err(SwapError::ConfigTranslation("unterminated managed block".into()));
    }
    while kept.first().is_some_and(|l| l.trim().is_empty()) {
        kept.remove(0);
    }
    while kept.last().is_some_and(|l| l.trim().is_empty()) {
        kept.pop();
    }
    Ok(kept.join("\n"))
}

/// Lines inside the managed block of `existing`, markers excluded.
#[must_use]
pub fn managed_section(existing: &str, comment: &str) -> Vec<String> {
    let begin = begin_marker(comment);
    let end = end_marker(comment);
    let mut inside = false;
    let mut out = Vec::new();
    for line in existing.lines() {
        let t = line.trim();
        if t == begin {
            inside = true;
        } else if t == end {
            inside = false;
        } else if inside {
            out.push(line.to_string());
        }
    }
    out
}

/// Append operator-owned `custom` lines after a generated, wrapped config.
#[must_use]
pub fn merge(generated: &str, custom: &str) -> String {
    if custom.trim().is_empty() {
        return generated.to_string();
    }
    let mut out = String::with_capacity(generated.len() + custom.len() + 2);
    out.push_str(generated);
    out.push('\n');
    out.push_str(custom.trim_end_matches('\n'));
    out.push('\n');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn custom_lines_survive_regeneration_verbatim() {
        let generated = wrap("#", "server {\n    listen 80;\n}");
        let with_custom = merge(&generated, "# operator tweak\nclient_max_body_size 64m;");
        let custom = extract_custom(&with_custom, "#").unwrap();
        assert_eq!(custom, "# operator tweak\nclient_max_body_size 64m;");

        let regenerated = merge(&wrap("#", "server {\n    listen 81;\n}"), &custom);
        assert!(regenerated.contains("listen 81;"));
        assert!(!regenerated.contains("listen 80;"));
        assert_eq!(extract_custom(&regenerated, "#").unwrap(), custom);
    }

    #[test]
    fn merge_is_stable_under_repeated_extraction() {
        let generated = wrap(";", "pm = dynamic");
        let once = merge(&generated, "php_value[foo] = 1");
        let twice = merge(&generated, &extract_custom(&once, ";").unwrap());
        assert_eq!(once, twice);
    }

    #[test]
    fn unmarked_file_is_entirely_custom() {
        assert_eq!(extract_custom("\nlisten 80;\n\n", "#").unwrap(), "listen 80;");
    }

    #[test]
    fn malformed_blocks_are_rejected() {
        let open = format!("{}\nx\n", begin_marker("#"));
        assert!(extract_custom(&open, "#").is_err());
        let stray = format!("x\n{}\n", end_marker("#"));
        assert!(extract_custom(&stray, "#").is_err());
    }

    #[test]
    fn managed_section_excludes_markers_and_custom() {
        let text = merge(&wrap(";", "a = 1\nb = 2"), "c = 3");
        assert_eq!(managed_section(&text, ";"), vec!["a = 1", "b = 2"]);
    }
}
