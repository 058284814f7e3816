//! Comma-corruption heuristics shared by every parser strategy
//!
//! Works on raw lines, so it runs whether or not the file parses.

use super::{CommaCorruption, ParserType};
use regex::Regex;
use std::sync::LazyLock;

/// Keywords that should never be directly followed by a comma
pub const CORRUPTION_KEYWORDS: [&str; 10] = [
    "def", "class", "import", "from", "return", "if", "elif", "else", "for", "while",
];

static KEYWORD_COMMA_RES: LazyLock<Vec<(&'static str, Regex)>> = LazyLock::new(|| {
    CORRUPTION_KEYWORDS
        .iter()
        .map(|kw| (*kw, Regex::new(&format!(r"\b{kw} ?,")).unwrap()))
        .collect()
});

static PAREN_COMMA_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\( ?,").unwrap());

/// Scan `content` for lines that look like accidental comma insertion
///
/// Every heuristic that matches a line yields its own record; a line can
/// therefore produce several records.
pub fn detect_comma_corruption(content: &str, parser: ParserType) -> Vec<CommaCorruption> {
    let confidence = parser.corruption_confidence();
    let mut corruptions = Vec::new();

    for (idx, raw) in content.split('\n').enumerate() {
        let line = raw.strip_suffix('\r').unwrap_or(raw);
        if !line.contains(',') {
            continue;
        }

        let lineno = idx + 1;
        let mut push = |message: String| {
            corruptions.push(CommaCorruption {
                message,
                lineno,
                confidence,
                parser_source: parser,
            });
        };

        let stripped = line.trim();
        if stripped.starts_with(',') && !stripped.starts_with(",,") {
            push(format!("Line starts with comma: {line}"));
        }

        for (keyword, re) in KEYWORD_COMMA_RES.iter() {
            if re.is_match(line) {
                push(format!("Comma after keyword '{keyword}': {line}"));
            }
        }

        if PAREN_COMMA_RE.is_match(line) {
            push(format!("Comma after opening parenthesis: {line}"));
        }

        if line.contains(",,") {
            push(format!("Double comma: {line}"));
        }
    }

    corruptions
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_starting_with_comma() {
        let found = detect_comma_corruption(",x = 1", ParserType::Ast);
        assert_eq!(found.len(), 1);
        assert!(found[0].message.contains("Line starts with comma"));
        assert_eq!(found[0].lineno, 1);
        assert_eq!(found[0].confidence, 1.0);
    }

    #[test]
    fn test_no_commas_no_records() {
        let source = "def f(a):\n    return a\n\nclass A:\n    pass\n";
        assert!(detect_comma_corruption(source, ParserType::Regex).is_empty());
        assert!(detect_comma_corruption("", ParserType::Text).is_empty());
    }

    #[test]
    fn test_keyword_followed_by_comma() {
        let found = detect_comma_corruption("x = 1\nreturn, value\n", ParserType::Text);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].lineno, 2);
        assert_eq!(found[0].message, "Comma after keyword 'return': return, value");
        assert_eq!(found[0].confidence, 0.7);
    }

    #[test]
    fn test_keyword_inside_identifier_is_ignored() {
        assert!(detect_comma_corruption("diff, elif_count = 1, 2", ParserType::Ast).is_empty());
        let found = detect_comma_corruption("elif, x:", ParserType::Ast);
        assert_eq!(found.len(), 1);
        assert!(found[0].message.contains("'elif'"));
    }

    #[test]
    fn test_multiple_heuristics_on_one_line() {
        let found = detect_comma_corruption("foo( ,a,,b)", ParserType::Regex);
        let messages: Vec<&str> = found.iter().map(|c| c.message.as_str()).collect();
        assert_eq!(
            messages,
            vec![
                "Comma after opening parenthesis: foo( ,a,,b)",
                "Double comma: foo( ,a,,b)",
            ]
        );
    }

    #[test]
    fn test_double_comma_at_line_start_is_not_leading_comma() {
        let found = detect_comma_corruption("    ,,x", ParserType::Ast);
        assert_eq!(found.len(), 1);
        assert!(found[0].message.starts_with("Double comma"));
    }

    #[test]
    fn test_two_spaces_before_comma_is_not_flagged() {
        assert!(detect_comma_corruption("call(  , x)", ParserType::Ast).is_empty());
    }
}
