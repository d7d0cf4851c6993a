//! Canonical slug generation for task/container filenames.
//!
//! Filenames embed a human-readable slug next to the numeric id, e.g.
//! `T001-wire-up-auth.todo`. Slugs are lowercase, ASCII, hyphen-separated,
//! and capped so filenames stay reasonable even for long titles.

const DEFAULT_MAX_LEN: usize = 60;

/// Derive a filename-safe slug from a title.
///
/// Non-alphanumeric runs collapse to a single hyphen, leading/trailing
/// hyphens are trimmed, and the result is truncated to `max_len` bytes
/// without splitting inside a UTF-8 boundary (ASCII-only output makes
/// this moot in practice, but `title` itself may contain non-ASCII).
pub fn slugify(title: &str, max_len: usize) -> String {
    let mut slug = String::with_capacity(title.len());
    let mut last_was_hyphen = true; // true so a leading separator doesn't emit '-'

    for ch in title.chars() {
        if ch.is_ascii_alphanumeric() {
            slug.push(ch.to_ascii_lowercase());
            last_was_hyphen = false;
        } else if !last_was_hyphen {
            slug.push('-');
            last_was_hyphen = true;
        }
    }

    while slug.ends_with('-') {
        slug.pop();
    }

    if slug.len() > max_len {
        let mut cut = max_len;
        while cut > 0 && !slug.is_char_boundary(cut) {
            cut -= 1;
        }
        slug.truncate(cut);
        while slug.ends_with('-') {
            slug.pop();
        }
    }

    if slug.is_empty() {
        "untitled".to_string()
    } else {
        slug
    }
}

/// Slugify with the default length cap.
pub fn slugify_default(title: &str) -> String {
    slugify(title, DEFAULT_MAX_LEN)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lowercases_and_hyphenates() {
        assert_eq!(slugify_default("Wire up Auth Flow"), "wire-up-auth-flow");
    }

    #[test]
    fn collapses_punctuation_runs() {
        assert_eq!(slugify_default("Fix: NPE!! (null user)"), "fix-npe-null-user");
    }

    #[test]
    fn trims_leading_and_trailing_separators() {
        assert_eq!(slugify_default("  --hello--  "), "hello");
    }

    #[test]
    fn truncates_to_max_len_without_trailing_hyphen() {
        let long = "a ".repeat(40);
        let slug = slugify(&long, 10);
        assert!(slug.len() <= 10);
        assert!(!slug.ends_with('-'));
    }

    #[test]
    fn empty_title_yields_placeholder() {
        assert_eq!(slugify_default("!!!"), "untitled");
    }
}
