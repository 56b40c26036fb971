//! Small string helpers shared by config parsing, the HTTP store and the CLI.

const MAX_ERROR_TEXT_CHARS: usize = 180;

/// Trim optional text, mapping blank values to `None`.
pub fn normalize_text_option(value: Option<String>) -> Option<String> {
    let value = value?;
    let value = value.trim();
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

/// Trimmed `http(s)` base URL without trailing slashes.
///
/// Returns `None` for blank input or any other scheme.
pub fn normalize_base_url(value: &str) -> Option<String> {
    let value = value.trim();
    if !(value.starts_with("http://") || value.starts_with("https://")) {
        return None;
    }
    Some(value.trim_end_matches('/').to_string())
}

/// Collapse whitespace and cap length so remote error bodies stay one readable line.
pub fn compact_text(value: &str) -> String {
    let collapsed = value.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.chars().count() <= MAX_ERROR_TEXT_CHARS {
        return collapsed;
    }
    let mut truncated = collapsed
        .chars()
        .take(MAX_ERROR_TEXT_CHARS - 3)
        .collect::<String>();
    truncated.push_str("...");
    truncated
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_text_option_trims_and_rejects_blank() {
        assert_eq!(normalize_text_option(None), None);
        assert_eq!(normalize_text_option(Some(" \t ".to_string())), None);
        assert_eq!(
            normalize_text_option(Some(" Stratus ".to_string())),
            Some("Stratus".to_string())
        );
    }

    #[test]
    fn normalize_base_url_strips_trailing_slashes() {
        assert_eq!(
            normalize_base_url(" https://blobs.example.com/v1// "),
            Some("https://blobs.example.com/v1".to_string())
        );
        assert_eq!(
            normalize_base_url("http://localhost:8080"),
            Some("http://localhost:8080".to_string())
        );
        assert_eq!(normalize_base_url("ftp://example.com"), None);
        assert_eq!(normalize_base_url("blobs.example.com"), None);
    }

    #[test]
    fn compact_text_collapses_and_caps() {
        assert_eq!(compact_text("  quota\n exceeded  "), "quota exceeded");
        let long = "x".repeat(400);
        let compacted = compact_text(&long);
        assert_eq!(compacted.chars().count(), MAX_ERROR_TEXT_CHARS);
        assert!(compacted.ends_with("..."));
    }
}
