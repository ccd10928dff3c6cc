//! Domain ID generation
//!
//! All IDs use the format: `{6-char-hex}-{type}-{slug}`
//! Example: `019430-task-add-oauth`

/// Generate a domain ID from type and title
pub fn generate_id(domain_type: &str, title: &str) -> String {
    let uuid = uuid::Uuid::now_v7();
    let hex_prefix = &uuid.to_string()[..6];
    let slug = slugify(title);
    if slug.is_empty() {
        format!("{}-{}", hex_prefix, domain_type)
    } else {
        format!("{}-{}-{}", hex_prefix, domain_type, slug)
    }
}

/// Slugify a title for use in IDs
fn slugify(title: &str) -> String {
    title
        .to_lowercase()
        .chars()
        .filter_map(|c| {
            if c.is_alphanumeric() {
                Some(c)
            } else if c == '\'' || c == '\u{2019}' || c == '\u{2018}' {
                None
            } else {
                Some('-')
            }
        })
        .collect::<String>()
        .split('-')
        .filter(|s| !s.is_empty())
        .take(5)
        .collect::<Vec<_>>()
        .join("-")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_id_format() {
        let id = generate_id("task", "Add OAuth support");
        let parts: Vec<&str> = id.splitn(3, '-').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0].len(), 6);
        assert_eq!(parts[1], "task");
        assert_eq!(parts[2], "add-oauth-support");
    }

    #[test]
    fn test_slugify_strips_punctuation() {
        assert_eq!(slugify("Don't panic!"), "dont-panic");
        assert_eq!(slugify("  spaces   everywhere  "), "spaces-everywhere");
    }

    #[test]
    fn test_generate_id_empty_title() {
        let id = generate_id("sess", "");
        let parts: Vec<&str> = id.splitn(2, '-').collect();
        assert_eq!(parts[1], "sess");
    }
}
