//! Behavior-preservation check for code-producing steps.
//!
//! Both texts are lexed into PL/SQL-ish tokens, the token kinds covered by
//! the allowed edit classes are normalized away, and what remains must be
//! identical. The lexer only needs to be good enough to tell code apart
//! from layout; it is not a parser.
use crate::catalog::EditClass;

pub trait BehaviorCheck: Send + Sync {
    /// `Err(detail)` naming the first divergence when `candidate` changes
    /// more than `allowed` permits.
    fn compare(&self, original: &str, candidate: &str, allowed: &[EditClass])
        -> Result<(), String>;
}

/// Exact comparison of normalized token sequences.
pub struct TokenSequenceCheck;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TokenKind {
    Word,
    QuotedIdent,
    StringLit,
    Number,
    Symbol,
    Comment,
    Whitespace,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Token {
    kind: TokenKind,
    text: String,
    line: usize,
}

const MULTI_CHAR_SYMBOLS: [&str; 9] = [":=", "=>", "||", "<=", ">=", "<>", "!=", "..", "**"];

fn lex(source: &str) -> Vec<Token> {
    let chars: Vec<char> = source.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;
    let mut line = 1;

    while i < chars.len() {
        let start = i;
        let start_line = line;
        let c = chars[i];
        let kind = if c.is_whitespace() {
            while i < chars.len() && chars[i].is_whitespace() {
                i += 1;
            }
            TokenKind::Whitespace
        } else if c == '-' && chars.get(i + 1) == Some(&'-') {
            while i < chars.len() && chars[i] != '\n' {
                i += 1;
            }
            TokenKind::Comment
        } else if c == '/' && chars.get(i + 1) == Some(&'*') {
            i += 2;
            while i < chars.len() && !(chars[i] == '*' && chars.get(i + 1) == Some(&'/')) {
                i += 1;
            }
            i = (i + 2).min(chars.len());
            TokenKind::Comment
        } else if c == '\'' {
            i += 1;
            while i < chars.len() {
                if chars[i] == '\'' {
                    // '' is an escaped quote inside the literal
                    if chars.get(i + 1) == Some(&'\'') {
                        i += 2;
                        continue;
                    }
                    i += 1;
                    break;
                }
                i += 1;
            }
            TokenKind::StringLit
        } else if c == '"' {
            i += 1;
            while i < chars.len() && chars[i] != '"' {
                i += 1;
            }
            i = (i + 1).min(chars.len());
            TokenKind::QuotedIdent
        } else if c.is_ascii_alphabetic() || c == '_' {
            while i < chars.len()
                && (chars[i].is_ascii_alphanumeric() || matches!(chars[i], '_' | '$' | '#'))
            {
                i += 1;
            }
            TokenKind::Word
        } else if c.is_ascii_digit() {
            while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                // stop before a range operator such as 1..10
                if chars[i] == '.' && chars.get(i + 1) == Some(&'.') {
                    break;
                }
                i += 1;
            }
            TokenKind::Number
        } else {
            let rest: String = chars[i..chars.len().min(i + 2)].iter().collect();
            if MULTI_CHAR_SYMBOLS.contains(&rest.as_str()) {
                i += 2;
            } else {
                i += 1;
            }
            TokenKind::Symbol
        };

        let text: String = chars[start..i].iter().collect();
        line += text.matches('\n').count();
        tokens.push(Token {
            kind,
            text,
            line: start_line,
        });
    }
    tokens
}

fn normalize(tokens: Vec<Token>, allowed: &[EditClass]) -> Vec<Token> {
    let skip_whitespace = allowed.contains(&EditClass::Whitespace);
    let skip_comments = allowed.contains(&EditClass::Comments);
    let fold_case = allowed.contains(&EditClass::KeywordCase);

    tokens
        .into_iter()
        .filter(|token| match token.kind {
            TokenKind::Whitespace => !skip_whitespace,
            TokenKind::Comment => !skip_comments,
            _ => true,
        })
        .map(|mut token| {
            if fold_case && token.kind == TokenKind::Word {
                token.text = token.text.to_lowercase();
            }
            token
        })
        .collect()
}

impl BehaviorCheck for TokenSequenceCheck {
    fn compare(
        &self,
        original: &str,
        candidate: &str,
        allowed: &[EditClass],
    ) -> Result<(), String> {
        let expected = normalize(lex(original.trim()), allowed);
        let actual = normalize(lex(candidate.trim()), allowed);

        for (idx, want) in expected.iter().enumerate() {
            match actual.get(idx) {
                Some(got) if got.kind == want.kind && got.text == want.text => {}
                Some(got) => {
                    return Err(format!(
                        "code diverges at output line {}: expected `{}` (input line {}), found `{}`",
                        got.line,
                        want.text.trim(),
                        want.line,
                        got.text.trim()
                    ))
                }
                None => {
                    return Err(format!(
                        "output ends early: `{}` from input line {} is missing",
                        want.text.trim(),
                        want.line
                    ))
                }
            }
        }
        if let Some(extra) = actual.get(expected.len()) {
            return Err(format!(
                "output adds `{}` at line {}",
                extra.text.trim(),
                extra.line
            ));
        }
        Ok(())
    }
}
