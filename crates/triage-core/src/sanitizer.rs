//! Edge sanitization and crisis detection.
//!
//! Runs synchronously on every request before anything else: emails and phone numbers are
//! replaced with fixed placeholders, then the redacted text is scanned (lowercased) for
//! crisis keywords. Regexes are compiled once when the sanitizer is built.

use regex::Regex;

use crate::model::SanitizationResult;

pub const EMAIL_PLACEHOLDER: &str = "[EMAIL REDACTED]";
pub const PHONE_PLACEHOLDER: &str = "[PHONE REDACTED]";

const EMAIL_PATTERN: &str = r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b";
const PHONE_PATTERN: &str = r"(\+\d{1,2}\s?)?\(?\d{3}\)?[\s.-]?\d{3}[\s.-]?\d{4}";

/// Lowercase text and fold typographic apostrophes to `'`, the form keywords and symptom
/// patterns are authored in.
pub fn fold_for_matching(text: &str) -> String {
    text.to_lowercase().replace(['\u{2019}', '\u{2018}', '\u{02BC}'], "'")
}

#[derive(Debug)]
struct CrisisKeyword {
    keyword: String,
    needle: String,
}

#[derive(Debug)]
pub struct Sanitizer {
    email_re: Regex,
    phone_re: Regex,
    crisis_keywords: Vec<CrisisKeyword>,
}

impl Sanitizer {
    pub fn new(crisis_keywords: &[String]) -> Self {
        let crisis_keywords = crisis_keywords
            .iter()
            .map(|k| CrisisKeyword {
                keyword: k.clone(),
                needle: fold_for_matching(k),
            })
            .collect();
        Self {
            email_re: Regex::new(EMAIL_PATTERN).expect("valid regex"),
            phone_re: Regex::new(PHONE_PATTERN).expect("valid regex"),
            crisis_keywords,
        }
    }

    pub fn sanitize_and_analyze(&self, input: &str) -> SanitizationResult {
        let without_emails = self.email_re.replace_all(input, EMAIL_PLACEHOLDER);
        let safe_text = self
            .phone_re
            .replace_all(&without_emails, PHONE_PLACEHOLDER)
            .into_owned();

        let lower = fold_for_matching(&safe_text);
        let detected_crisis_keywords: Vec<String> = self
            .crisis_keywords
            .iter()
            .filter(|k| lower.contains(&k.needle))
            .map(|k| k.keyword.clone())
            .collect();

        SanitizationResult {
            safe_text,
            has_crisis_keywords: !detected_crisis_keywords.is_empty(),
            detected_crisis_keywords,
        }
    }

    /// Byte-level entry point for untrusted input. Undecodable sequences become U+FFFD,
    /// which no keyword or PII pattern can match.
    pub fn sanitize_bytes(&self, input: &[u8]) -> SanitizationResult {
        self.sanitize_and_analyze(&String::from_utf8_lossy(input))
    }
}
