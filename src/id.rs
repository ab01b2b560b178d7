//! Item filename generation
//!
//! Queue items are named `{YYYY-MM-DD_HHMMSS}_{origin}_{slug}.md` when admitted and
//! `{YYYY-MM-DD}_{tag}_{stem}.md` when moved between stages. Names that are already
//! taken get a short random suffix in front of the extension.

use chrono::{NaiveDate, NaiveDateTime};
use rand::Rng;

/// File extension of every queue item
pub const ITEM_EXTENSION: &str = "md";

/// Maximum length of the title-derived part of a filename
pub const MAX_SLUG_LEN: usize = 50;

/// Turn free text into a filesystem-safe slug of at most 50 characters
///
/// Whitespace becomes `_`, anything outside `[A-Za-z0-9._-]` is dropped.
/// Example: `Invoice #42 due` -> `Invoice_42_due`
pub fn slugify(text: &str) -> String {
    let slug: String = text
        .trim()
        .chars()
        .filter_map(|c| {
            if c.is_whitespace() {
                Some('_')
            } else if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' {
                Some(c)
            } else {
                None
            }
        })
        .take(MAX_SLUG_LEN)
        .collect();

    let slug = slug.trim_matches('.').to_string();
    if slug.is_empty() { "item".to_string() } else { slug }
}

/// Generate the filename for a newly admitted item
///
/// Format: `{YYYY-MM-DD_HHMMSS}_{origin}_{slug}.md`
/// Example: `2026-01-15_093000_gmail_Quarterly_report.md`
pub fn item_file_name(at: NaiveDateTime, origin: &str, title: &str) -> String {
    format!(
        "{}_{}_{}.{}",
        at.format("%Y-%m-%d_%H%M%S"),
        slugify(origin),
        slugify(title),
        ITEM_EXTENSION
    )
}

/// Generate the filename an item takes when it moves to another stage
///
/// Format: `{YYYY-MM-DD}_{tag}_{stem}.md`
/// Example: `2026-01-15_sent_2026-01-14_101500_draft_Hello.md`
pub fn transition_file_name(on: NaiveDate, tag: &str, stem: &str) -> String {
    format!("{}_{}_{}.{}", on.format("%Y-%m-%d"), slugify(tag), stem, ITEM_EXTENSION)
}

/// Append a random 4-hex-digit token before the extension
///
/// Example: `a_b.md` -> `a_b-3f9c.md`
pub fn disambiguate(file_name: &str) -> String {
    let random: u16 = rand::rng().random();
    let suffix = format!("-{:04x}", random);
    match file_name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => format!("{}{}.{}", stem, suffix, ext),
        _ => format!("{}{}", file_name, suffix),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, mo, d)
            .unwrap()
            .and_hms_opt(h, mi, s)
            .unwrap()
    }

    #[test]
    fn test_slugify_replaces_whitespace() {
        assert_eq!(slugify("Quarterly report draft"), "Quarterly_report_draft");
    }

    #[test]
    fn test_slugify_drops_unsafe_chars() {
        assert_eq!(slugify("Re: invoice #42 / paid?"), "Re_invoice_42__paid");
    }

    #[test]
    fn test_slugify_truncates_to_fifty() {
        let long = "a".repeat(120);
        assert_eq!(slugify(&long).len(), MAX_SLUG_LEN);
    }

    #[test]
    fn test_slugify_empty_falls_back() {
        assert_eq!(slugify("???"), "item");
        assert_eq!(slugify(""), "item");
    }

    #[test]
    fn test_item_file_name_format() {
        let name = item_file_name(at(2026, 1, 15, 9, 30, 0), "gmail", "Quarterly report");
        assert_eq!(name, "2026-01-15_093000_gmail_Quarterly_report.md");
    }

    #[test]
    fn test_transition_file_name_format() {
        let day = NaiveDate::from_ymd_opt(2026, 1, 16).unwrap();
        let name = transition_file_name(day, "sent", "2026-01-15_093000_draft_Hello");
        assert_eq!(name, "2026-01-16_sent_2026-01-15_093000_draft_Hello.md");
    }

    #[test]
    fn test_disambiguate_keeps_extension() {
        let name = disambiguate("2026-01-16_sent_x.md");
        assert!(name.starts_with("2026-01-16_sent_x-"));
        assert!(name.ends_with(".md"));
        let token = &name["2026-01-16_sent_x-".len()..name.len() - 3];
        assert_eq!(token.len(), 4);
        assert!(token.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_disambiguate_without_extension() {
        let name = disambiguate("plain");
        assert!(name.starts_with("plain-"));
        assert_eq!(name.len(), "plain-".len() + 4);
    }
}
