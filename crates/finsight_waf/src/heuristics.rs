//! Pattern heuristics for SQL injection and cross-site scripting.
//!
//! These approximate the managed detectors closely enough to evaluate a
//! compiled policy offline. They run on already transformed text.

use std::sync::OnceLock;

use regex::Regex;

fn sqli_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(concat!(
            r"(?i)(",
            r"\bunion\s+(all\s+)?select\b",
            r"|'\s*(or|and)\s+'?[\w-]+'?\s*(=|<|>|like)",
            r"|\b(or|and)\s+\d+\s*=\s*\d+",
            r"|;\s*(drop|delete|insert|update|alter|create|truncate|exec)\b",
            r"|'\s*(--|#)",
            r"|/\*.*?\*/",
            r"|\b(sleep|benchmark|pg_sleep)\s*\(",
            r"|\bwaitfor\s+delay\b",
            r"|\bselect\b.+\bfrom\b.+\bwhere\b",
            r")"
        ))
        .expect("static SQL injection pattern")
    })
}

fn xss_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(concat!(
            r"(?i)(",
            r"<\s*script\b",
            r"|<\s*/\s*script\s*>",
            r"|javascript\s*:",
            r"|vbscript\s*:",
            r"|<[^>]*\bon[a-z]+\s*=",
            r"|<\s*(iframe|object|embed|applet|meta|base)\b",
            r"|\bexpression\s*\(",
            r"|document\s*\.\s*(cookie|write|location)",
            r")"
        ))
        .expect("static XSS pattern")
    })
}

/// True when `text` looks like an SQL injection attempt.
pub fn looks_like_sqli(text: &str) -> bool {
    sqli_pattern().is_match(text)
}

/// True when `text` looks like a cross-site scripting attempt.
pub fn looks_like_xss(text: &str) -> bool {
    xss_pattern().is_match(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sqli_detected() {
        assert!(looks_like_sqli("id=1 UNION SELECT password FROM users"));
        assert!(looks_like_sqli("name=' OR '1'='1"));
        assert!(looks_like_sqli("id=1 or 1=1"));
        assert!(looks_like_sqli("x'; DROP TABLE accounts"));
        assert!(looks_like_sqli("admin'--"));
        assert!(looks_like_sqli("1; select pg_sleep(5)"));
    }

    #[test]
    fn test_sqli_clean_input() {
        assert!(!looks_like_sqli("category=groceries&month=2024-01"));
        assert!(!looks_like_sqli(r#"{"amount": 1200, "memo": "Union station parking"}"#));
        assert!(!looks_like_sqli("O'Reilly books"));
    }

    #[test]
    fn test_xss_detected() {
        assert!(looks_like_xss("<script>alert(1)</script>"));
        assert!(looks_like_xss("<img src=x onerror=alert(1)>"));
        assert!(looks_like_xss("href=javascript:alert(1)"));
        assert!(looks_like_xss("<iframe src=//evil>"));
    }

    #[test]
    fn test_xss_clean_input() {
        assert!(!looks_like_xss("note=dinner with friends"));
        assert!(!looks_like_xss(r#"{"description": "a < b and c > d"}"#));
        assert!(!looks_like_xss("option=monthly"));
    }
}
