//! LIKE and REGEXP pattern matching.

use regex::{Regex, RegexBuilder};

use mirage_core::{EngineError, Result};

/// Translates a SQL LIKE pattern into an anchored regex: `%` becomes
/// `.*`, `_` becomes `.`, while `\%` and `\_` stay literal. Everything
/// else is regex-escaped.
pub fn like_to_regex(pattern: &str) -> String {
    let mut out = String::with_capacity(pattern.len() + 8);
    out.push('^');
    let mut chars = pattern.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\\' => match chars.peek() {
                Some('%') => {
                    out.push_str(&regex::escape("%"));
                    chars.next();
                }
                Some('_') => {
                    out.push('_');
                    chars.next();
                }
                Some(&next) => {
                    out.push_str(&regex::escape(&next.to_string()));
                    chars.next();
                }
                None => out.push_str(&regex::escape("\\")),
            },
            '%' => out.push_str(".*"),
            '_' => out.push('.'),
            other => out.push_str(&regex::escape(&other.to_string())),
        }
    }
    out.push('$');
    out
}

/// Compiles a LIKE pattern, matching case-insensitively the way the
/// default MySQL collation does.
pub fn compile_like(pattern: &str) -> Result<Regex> {
    compile(&like_to_regex(pattern))
}

/// Compiles a REGEXP pattern, also case-insensitive.
pub fn compile_regexp(pattern: &str) -> Result<Regex> {
    compile(pattern)
}

fn compile(pattern: &str) -> Result<Regex> {
    RegexBuilder::new(pattern)
        .case_insensitive(true)
        .build()
        .map_err(|e| EngineError::query(format!("invalid pattern: {e}")))
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn translation_maps_wildcards() {
        assert_eq!(like_to_regex("a%b_c"), "^a.*b.c$");
        assert_eq!(like_to_regex("100\\%"), "^100%$");
        assert_eq!(like_to_regex("a\\_b"), "^a_b$");
    }

    #[test]
    fn metacharacters_are_escaped() {
        let re = compile_like("a.c%").unwrap();
        assert!(re.is_match("a.cde"));
        assert!(!re.is_match("abcde"));
    }

    #[test]
    fn like_is_case_insensitive() {
        let re = compile_like("%World%").unwrap();
        assert!(re.is_match("hello world"));
        assert!(!re.is_match("hello"));
    }

    #[test]
    fn substring_pattern_matches_contained_text() {
        let re = compile_like("%x%").unwrap();
        assert!(re.is_match("axb"));
        assert!(re.is_match("x"));
        assert!(!re.is_match("ab"));
    }
}
