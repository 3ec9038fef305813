//! Small string transforms shared by the transfer jobs.

use chrono::Utc;
use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref NON_ALNUM: Regex = Regex::new("[^a-z0-9]+").expect("valid slug pattern");
}

/// Build a URL-safe slug from a display name: lowercase, runs of anything
/// outside `[a-z0-9]` collapse to a single dash, dashes trimmed.
pub fn slugify(name: &str) -> String {
    NON_ALNUM
        .replace_all(&name.to_lowercase(), "-")
        .trim_matches('-')
        .to_string()
}

/// Truncate to at most `max` characters, respecting char boundaries.
pub fn truncate(value: &str, max: usize) -> String {
    value.chars().take(max).collect()
}

/// Placeholder address for rows whose legacy email is NULL or empty. The
/// nanosecond stamp keeps generated addresses unique across a run.
pub fn placeholder_email(record_id: &str) -> String {
    let nanos = Utc::now().timestamp_nanos_opt().unwrap_or_default();
    format!("no-email-{record_id}-{nanos}@placeholder.com")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slugify_collapses_special_characters() {
        assert_eq!(slugify("Al-Amin Travel & Tours"), "al-amin-travel-tours");
        assert_eq!(slugify("  PT. Berkah Jaya  "), "pt-berkah-jaya");
        assert_eq!(slugify("UMRAH 2024"), "umrah-2024");
    }

    #[test]
    fn slugify_trims_leading_and_trailing_dashes() {
        assert_eq!(slugify("---hello---"), "hello");
        assert_eq!(slugify("!!!"), "");
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate("0812345678901234567", 16), "0812345678901234");
        assert_eq!(truncate("short", 16), "short");
        assert_eq!(truncate("héllo wörld", 5), "héllo");
    }

    #[test]
    fn placeholder_email_embeds_the_record_id() {
        let email = placeholder_email("abc-123");
        assert!(email.starts_with("no-email-abc-123-"));
        assert!(email.ends_with("@placeholder.com"));
    }
}
