//! Plain-text rendering of backend data for the terminal.
//!
//! Everything shown here comes from the backend and ultimately from
//! scraped news sites, so it is stripped of control characters first.

use std::borrow::Cow;
use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

use crate::api::{Article, UserProfile};

const ELLIPSIS: &str = "...";

/// Remove terminal escape sequences and control characters, folding
/// newlines and tabs into single spaces.
pub fn clean(s: &str) -> Cow<'_, str> {
    if !s.chars().any(|c| c.is_control()) {
        return Cow::Borrowed(s);
    }

    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\x1b' => match chars.peek() {
                // CSI: parameters up to a final byte in '@'..='~'
                Some('[') => {
                    chars.next();
                    for next in chars.by_ref() {
                        if ('@'..='~').contains(&next) {
                            break;
                        }
                    }
                }
                // OSC: until BEL or ESC '\'
                Some(']') => {
                    chars.next();
                    while let Some(next) = chars.next() {
                        if next == '\x07' {
                            break;
                        }
                        if next == '\x1b' && chars.peek() == Some(&'\\') {
                            chars.next();
                            break;
                        }
                    }
                }
                _ => {}
            },
            '\n' | '\r' | '\t' => {
                if !out.ends_with(' ') {
                    out.push(' ');
                }
            }
            c if c.is_control() => {}
            c => out.push(c),
        }
    }
    Cow::Owned(out)
}

/// Truncate `s` to at most `max_width` terminal columns, marking the cut
/// with an ellipsis when there is room for one.
pub fn fit(s: &str, max_width: usize) -> Cow<'_, str> {
    if UnicodeWidthStr::width(s) <= max_width {
        return Cow::Borrowed(s);
    }

    let budget = if max_width > ELLIPSIS.len() {
        max_width - ELLIPSIS.len()
    } else {
        max_width
    };

    let mut used = 0;
    let mut end = 0;
    for (idx, c) in s.char_indices() {
        let w = UnicodeWidthChar::width(c).unwrap_or(0);
        if used + w > budget {
            break;
        }
        used += w;
        end = idx + c.len_utf8();
    }

    if max_width > ELLIPSIS.len() {
        Cow::Owned(format!("{}{}", s[..end].trim_end(), ELLIPSIS))
    } else {
        Cow::Owned(s[..end].to_string())
    }
}

/// One listing line: `#id  [♥ likes]  title  (source, date)`.
pub fn article_line(article: &Article, width: usize) -> String {
    let marker = if article.liked { '♥' } else { '♡' };
    let prefix = format!("#{:<6} {} {:>4}  ", article.id, marker, article.likes);
    let suffix = format!(
        "  ({}, {})",
        clean(&article.source.name),
        article.posted_at.format("%Y-%m-%d")
    );
    let room = width
        .saturating_sub(UnicodeWidthStr::width(prefix.as_str()))
        .saturating_sub(UnicodeWidthStr::width(suffix.as_str()))
        .max(10);
    let title = clean(&article.title);
    format!("{prefix}{}{suffix}", fit(&title, room))
}

pub fn profile_block(profile: &UserProfile) -> String {
    let mut out = format!(
        "Name:  {}\nEmail: {}",
        clean(&profile.name),
        clean(&profile.email)
    );
    if let Some(since) = &profile.registered_at {
        out.push_str(&format!("\nSince: {}", clean(since)));
    }
    if let Some(picture) = &profile.picture {
        out.push_str(&format!("\nPhoto: {}", clean(picture)));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::test_support::article;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_clean_passthrough_borrows() {
        assert!(matches!(clean("Plain headline"), Cow::Borrowed(_)));
    }

    #[test]
    fn test_clean_strips_escapes_and_folds_whitespace() {
        assert_eq!(clean("\x1b[31mRed\x1b[0m news"), "Red news");
        assert_eq!(clean("a\x1b]0;title\x07b"), "ab");
        assert_eq!(clean("line one\n\nline two"), "line one line two");
        assert_eq!(clean("bell\x07"), "bell");
    }

    #[test]
    fn test_fit() {
        assert_eq!(fit("Short", 10), "Short");
        assert_eq!(fit("Hello World", 8), "Hello...");
        assert_eq!(fit("日本語のニュース", 7), "日本...");
        assert_eq!(fit("Test", 2), "Te");
        assert_eq!(fit("Test", 0), "");
    }

    #[test]
    fn test_article_line_fits_width() {
        let mut a = article(12);
        a.title = "A very long headline that will certainly not fit".to_string();
        a.liked = true;
        a.likes = 3;
        let line = article_line(&a, 60);
        assert!(line.starts_with("#12"));
        assert!(line.contains('♥'));
        assert!(line.contains("(Example, 2024-01-01)"));
        assert!(UnicodeWidthStr::width(line.as_str()) <= 60);
    }

    #[test]
    fn test_profile_block_skips_missing_fields() {
        let profile = UserProfile {
            name: "Ana".to_string(),
            email: "ana@example.com".to_string(),
            registered_at: None,
            picture: None,
        };
        assert_eq!(profile_block(&profile), "Name:  Ana\nEmail: ana@example.com");
    }
}
