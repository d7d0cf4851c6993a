//! The `---\n<yaml>\n---\n<body>` envelope shared by every task file.

/// Split `content` into its frontmatter block and markdown body.
///
/// Returns a human-readable reason string on failure so callers can wrap it
/// in `BacklogError::MalformedFrontmatter` with the offending path attached.
pub fn split(content: &str) -> Result<(&str, &str), String> {
    let trimmed = content.trim_start();
    if !trimmed.starts_with("---") {
        return Err("missing opening '---' frontmatter delimiter".to_string());
    }

    let after_open = &trimmed[3..];
    let after_open = after_open.strip_prefix('\n').unwrap_or(after_open);

    let close_pos = after_open
        .find("\n---")
        .ok_or_else(|| "missing closing '---' frontmatter delimiter".to_string())?;

    let frontmatter = &after_open[..close_pos];
    // `close_pos + 4` consumes the closing delimiter line's own `\n---`;
    // `join` always follows it with a blank separator line (`\n\n`), so a
    // second `\n` here is the separator, not part of the body.
    let body = &after_open[close_pos + 4..];
    let body = body.strip_prefix('\n').unwrap_or(body);
    let body = body.strip_prefix('\n').unwrap_or(body);

    Ok((frontmatter, body))
}

/// Re-assemble a frontmatter block and body into envelope form.
pub fn join(frontmatter_yaml: &str, body: &str) -> String {
    let fm = frontmatter_yaml.trim_end_matches('\n');
    format!("---\n{fm}\n---\n\n{body}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_then_join_round_trips() {
        let content = "---\nid: P1\ntitle: X\n---\n\nBody text.\n";
        let (fm, body) = split(content).unwrap();
        assert_eq!(fm, "id: P1\ntitle: X");
        assert_eq!(body, "Body text.\n");
        let rejoined = join(fm, body);
        assert_eq!(rejoined, content);
    }

    #[test]
    fn missing_opening_marker_is_error() {
        assert!(split("no envelope").is_err());
    }

    #[test]
    fn missing_closing_marker_is_error() {
        assert!(split("---\nid: P1\n").is_err());
    }

    #[test]
    fn body_with_internal_dashes_is_preserved() {
        let content = "---\nid: P1\n---\n\nSee --- this is not a delimiter.\n";
        let (_, body) = split(content).unwrap();
        assert_eq!(body, "See --- this is not a delimiter.\n");
    }
}
