//! Splits a single source line into an opcode mnemonic and argument tokens.
//!
//! Comments start at the first `;`, `|`, `?`, or `}` and run to the end of
//! the line. Tokens are separated by spaces, except that a token beginning
//! with `"` extends to the next `"`, interior spaces included. The mnemonic
//! and unquoted argument tokens are upper-cased; quoted tokens keep their
//! case.

use regex::Regex;
use crate::token::TokenSpan;

const COMMENT_MARKERS: [char; 4] = [';', '|', '?', '}'];

/// A single lexed token together with its span in the original line.
#[derive(Debug, Clone)]
pub struct Token {
    pub text: String,
    pub span: TokenSpan,
}

/// The result of lexing one line: an optional mnemonic and its arguments.
/// `mnemonic` is `None` for blank or comment-only lines.
#[derive(Debug, Clone)]
pub struct LexedLine {
    pub mnemonic: Option<Token>,
    pub arguments: Vec<Token>,
}

/// Strip everything from the first comment marker onward.
pub fn strip_comment(line: &str) -> &str {
    match line.find(|c: char| COMMENT_MARKERS.contains(&c)) {
        Some(idx) => &line[..idx],
        None => line,
    }
}

/// Lex one source line.
pub fn lex(line: &str) -> LexedLine {
    let code = strip_comment(line);
    let trimmed = code.trim_start();
    let leading_ws = code.len() - trimmed.len();

    if trimmed.trim_end().is_empty() {
        return LexedLine { mnemonic: None, arguments: Vec::new() };
    }

    let re = Regex::new(r#""[^"]*"|[^\s]+"#).unwrap();
    let mut tokens = Vec::new();
    for mat in re.find_iter(trimmed) {
        let raw = mat.as_str();
        let is_quoted = raw.trim_start_matches('*').starts_with('"');
        let text = if is_quoted { raw.to_string() } else { raw.to_uppercase() };
        let span = TokenSpan::new(leading_ws + mat.start(), leading_ws + mat.end());
        tokens.push(Token { text, span });
    }

    let mut iter = tokens.into_iter();
    let mnemonic = iter.next();
    let arguments = iter.collect();
    LexedLine { mnemonic, arguments }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_and_comment_lines_have_no_mnemonic() {
        assert!(lex("").mnemonic.is_none());
        assert!(lex("   ").mnemonic.is_none());
        assert!(lex("; just a comment").mnemonic.is_none());
    }

    #[test]
    fn strips_any_of_the_four_comment_markers() {
        assert_eq!(strip_comment("STB 1 2 ; tail"), "STB 1 2 ");
        assert_eq!(strip_comment("STB 1 2 | tail"), "STB 1 2 ");
        assert_eq!(strip_comment("STB 1 2 ? tail"), "STB 1 2 ");
        assert_eq!(strip_comment("STB 1 2 } tail"), "STB 1 2 ");
    }

    #[test]
    fn upper_cases_mnemonic_and_plain_arguments() {
        let lexed = lex("stb 1 loop");
        assert_eq!(lexed.mnemonic.unwrap().text, "STB");
        assert_eq!(lexed.arguments[1].text, "LOOP");
    }

    #[test]
    fn keeps_case_inside_quoted_tokens() {
        let lexed = lex(r#"STS "Hello, world" 10"#);
        assert_eq!(lexed.arguments[0].text, "\"Hello, world\"");
    }

    #[test]
    fn quoted_detection_survives_leading_stars() {
        let lexed = lex(r#"RDS *"oops""#);
        assert_eq!(lexed.arguments[0].text, "*\"oops\"");
    }
}
