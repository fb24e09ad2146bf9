//! Answer validation and MarkdownV2 formatting.
//!
//! Users format free text with the custom delimiters `<negrito>` (bold) and
//! `<italico>` (italic). Before a value is stored the literal emphasis
//! characters are escaped and the delimiters are rewritten to MarkdownV2.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Custom bold delimiter typed by users.
pub const BOLD_DELIMITER: &str = "<negrito>";
/// Custom italic delimiter typed by users.
pub const ITALIC_DELIMITER: &str = "<italico>";

/// Characters the strict dialect requires to be escaped in plain text.
const RESERVED: [char; 12] = ['.', '-', '!', '=', '(', ')', '+', '#', '{', '}', '|', '>'];

static CURRENCY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d{1,3}(\.\d{3})*|\d+),\d{2}$").expect("currency pattern is valid")
});

static PERCENTAGE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{1,2}(,\d{1,2})?%$").expect("percentage pattern is valid"));

/// How the transport should interpret an outbound message's text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum MarkupDialect {
    Plain,
    #[default]
    MarkdownV2,
}

/// True iff `delimiter` occurs an even number of times in `text`.
pub fn balanced(text: &str, delimiter: &str) -> bool {
    if delimiter.is_empty() {
        return true;
    }
    text.matches(delimiter).count() % 2 == 0
}

/// Escape literal emphasis characters, then turn the custom delimiters into
/// MarkdownV2 emphasis markers.
pub fn normalize_markup(text: &str) -> String {
    text.replace('*', "\\*")
        .replace('_', "\\_")
        .replace(BOLD_DELIMITER, "*")
        .replace(ITALIC_DELIMITER, "_")
}

/// Backslash-escape the reserved MarkdownV2 characters.
pub fn escape_reserved(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 8);
    for c in text.chars() {
        if RESERVED.contains(&c) {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Brazilian currency amount: `1.234,56` or `1234,56`.
pub fn currency_shape(text: &str) -> bool {
    CURRENCY.is_match(text)
}

/// Percentage with up to two integer and two decimal digits: `12,5%`.
pub fn percentage_shape(text: &str) -> bool {
    PERCENTAGE.is_match(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn currency_examples() {
        assert!(currency_shape("1.234,56"));
        assert!(currency_shape("1234,56"));
        assert!(currency_shape("0,99"));
        assert!(currency_shape("12.345.678,00"));
        assert!(!currency_shape("1234.56"));
        assert!(!currency_shape("1.23,45"));
        assert!(!currency_shape("12,5"));
        assert!(!currency_shape(""));
    }

    #[test]
    fn percentage_examples() {
        assert!(percentage_shape("12,5%"));
        assert!(percentage_shape("7%"));
        assert!(percentage_shape("99,99%"));
        assert!(!percentage_shape("123%"));
        assert!(!percentage_shape("12,345%"));
        assert!(!percentage_shape("12.5%"));
        assert!(!percentage_shape("12"));
    }

    #[test]
    fn balanced_counts_delimiters() {
        assert!(balanced("<negrito>a<negrito>", BOLD_DELIMITER));
        assert!(!balanced("<negrito>a", BOLD_DELIMITER));
        assert!(balanced("no markup", BOLD_DELIMITER));
        assert!(balanced("<italico>x<italico> <italico>y<italico>", ITALIC_DELIMITER));
        assert!(!balanced("<italico>x<italico> <italico>y", ITALIC_DELIMITER));
    }

    #[test]
    fn normalize_escapes_before_substituting() {
        assert_eq!(
            normalize_markup("<negrito>a*b<negrito> e <italico>c_d<italico>"),
            "*a\\*b* e _c\\_d_"
        );
    }

    #[test]
    fn normalize_leaves_plain_text_alone() {
        assert_eq!(normalize_markup("Maria Silva"), "Maria Silva");
    }

    #[test]
    fn escape_reserved_covers_every_character() {
        assert_eq!(
            escape_reserved(".-!=()+#{}|>"),
            "\\.\\-\\!\\=\\(\\)\\+\\#\\{\\}\\|\\>"
        );
        assert_eq!(escape_reserved("a@b.com"), "a@b\\.com");
        assert_eq!(escape_reserved("plain"), "plain");
    }
}
