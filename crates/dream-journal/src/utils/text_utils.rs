//! Text helpers for search and term statistics

use lazy_static::lazy_static;
use regex::Regex;
use std::borrow::Cow;
use std::collections::HashSet;

lazy_static! {
    static ref WHITESPACE_REGEX: Regex = Regex::new(r"\s+").expect("valid whitespace regex");
    static ref TOKEN_SEPARATOR: Regex = Regex::new(r"[^\p{L}\p{N}]+").expect("valid separator regex");
    static ref STOP_WORDS: HashSet<&'static str> = [
        "the", "a", "an", "and", "or", "but", "in", "on", "at", "to", "for",
        "of", "with", "by", "is", "am", "are", "was", "were", "be", "been",
        "being", "have", "has", "had", "do", "does", "did", "will", "would",
        "shall", "should", "may", "might", "must", "can", "could", "i", "you",
        "he", "she", "it", "we", "they", "me", "him", "her", "us", "them",
        "my", "your", "his", "its", "our", "their", "mine", "yours", "hers",
        "ours", "theirs", "this", "that", "these", "those", "not", "no",
        "there", "then", "than", "as", "from", "into", "out", "up", "down",
        "so", "if", "about", "some", "any", "all", "very", "just", "also",
        "which", "who", "what", "when", "where", "while", "none",
    ]
    .into_iter()
    .collect();
}

pub struct TextUtils;

impl TextUtils {
    /// Case-insensitive substring test. An empty pattern matches everything.
    pub fn contains_ignore_case(text: &str, pattern: &str) -> bool {
        if pattern.is_empty() {
            return true;
        }
        text.to_lowercase().contains(&pattern.to_lowercase())
    }

    pub fn normalize_whitespace(text: &str) -> Cow<'_, str> {
        if WHITESPACE_REGEX.is_match(text) {
            Cow::Owned(WHITESPACE_REGEX.replace_all(text, " ").trim().to_string())
        } else {
            Cow::Borrowed(text)
        }
    }

    /// Truncate on a char boundary, appending "..." when anything was cut.
    pub fn truncate_with_ellipsis(text: &str, max_chars: usize) -> Cow<'_, str> {
        if text.chars().count() <= max_chars {
            return Cow::Borrowed(text);
        }
        if max_chars <= 3 {
            return Cow::Borrowed("...");
        }
        let kept: String = text.chars().take(max_chars - 3).collect();
        Cow::Owned(format!("{}...", kept.trim_end()))
    }

    /// Lowercased tokens split on runs of non-alphanumeric characters.
    pub fn tokenize(text: &str) -> Vec<String> {
        TOKEN_SEPARATOR
            .split(&text.to_lowercase())
            .filter(|token| !token.is_empty())
            .map(str::to_string)
            .collect()
    }

    pub fn is_stop_word(word: &str) -> bool {
        STOP_WORDS.contains(word.to_lowercase().as_str())
    }

    /// Tokens worth counting: longer than one character and not a stop word.
    pub fn significant_terms(text: &str) -> Vec<String> {
        Self::tokenize(text)
            .into_iter()
            .filter(|token| token.chars().count() > 1 && !STOP_WORDS.contains(token.as_str()))
            .collect()
    }
}
