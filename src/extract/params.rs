//! Parameter-list splitting for the textual strategies
//!
//! Mirrors how the AST strategy classifies parameters: everything before a
//! bare `*` or `*args` is positional, everything after is keyword-only.

/// Parameters of one signature
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Parameters {
    pub args: Vec<String>,
    pub kwargs: Vec<(String, Option<String>)>,
}

/// Split the text between the parentheses of a `def`
///
/// `skip_receiver` drops `self`/`cls` for methods.
pub fn split_parameters(params: &str, skip_receiver: bool) -> Parameters {
    let mut parsed = Parameters::default();
    let mut keyword_only = false;

    for piece in split_top_level(params, ',') {
        let piece = piece.trim();
        if piece.is_empty() || piece == "/" || piece.starts_with("**") {
            continue;
        }
        if piece.starts_with('*') {
            keyword_only = true;
            continue;
        }

        let (declaration, default) = match find_top_level(piece, '=') {
            Some(idx) => (&piece[..idx], Some(piece[idx + 1..].trim().to_string())),
            None => (piece, None),
        };
        let name = match find_top_level(declaration, ':') {
            Some(idx) => &declaration[..idx],
            None => declaration,
        }
        .trim()
        .to_string();

        if name.is_empty() {
            continue;
        }

        if keyword_only {
            parsed.kwargs.push((name, default));
        } else if !(skip_receiver && (name == "self" || name == "cls")) {
            parsed.args.push(name);
        }
    }

    parsed
}

/// Split on `sep` where it is not nested in brackets or quotes
pub fn split_top_level(text: &str, sep: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut start = 0;
    let mut scanner = Scanner::default();

    for (idx, ch) in text.char_indices() {
        if scanner.at_top_level(ch) && ch == sep {
            parts.push(&text[start..idx]);
            start = idx + ch.len_utf8();
        }
    }
    parts.push(&text[start..]);
    parts
}

fn find_top_level(text: &str, target: char) -> Option<usize> {
    let mut scanner = Scanner::default();
    text.char_indices()
        .find(|(_, ch)| scanner.at_top_level(*ch) && *ch == target)
        .map(|(idx, _)| idx)
}

/// Tracks bracket depth and string state one character at a time
#[derive(Default)]
struct Scanner {
    depth: i32,
    quote: Option<char>,
}

impl Scanner {
    /// Feed one character; true when it sits outside brackets and strings
    fn at_top_level(&mut self, ch: char) -> bool {
        if let Some(q) = self.quote {
            if ch == q {
                self.quote = None;
            }
            return false;
        }
        match ch {
            '"' | '\'' => {
                self.quote = Some(ch);
                false
            }
            '(' | '[' | '{' => {
                self.depth += 1;
                false
            }
            ')' | ']' | '}' => {
                self.depth -= 1;
                false
            }
            _ => self.depth <= 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_positional_and_keyword_only() {
        let params = split_parameters("a, b: int = 2, *, key=None, flag: bool", false);
        assert_eq!(params.args, vec!["a", "b"]);
        assert_eq!(
            params.kwargs,
            vec![
                ("key".to_string(), Some("None".to_string())),
                ("flag".to_string(), None),
            ]
        );
    }

    #[test]
    fn test_varargs_switch_to_keyword_only() {
        let params = split_parameters("self, x, *args, y=1, **kwargs", true);
        assert_eq!(params.args, vec!["x"]);
        assert_eq!(params.kwargs, vec![("y".to_string(), Some("1".to_string()))]);
    }

    #[test]
    fn test_nested_brackets_are_not_split() {
        let params = split_parameters("mapping: Dict[str, int], pair=(1, 2)", false);
        assert_eq!(params.args, vec!["mapping", "pair"]);
        assert!(params.kwargs.is_empty());
    }

    #[test]
    fn test_empty_and_positional_marker() {
        assert_eq!(split_parameters("", false), Parameters::default());
        assert_eq!(split_parameters("a, /, b", false).args, vec!["a", "b"]);
    }
}
