//! Source text → token stream (spec §4.1).
//!
//! `Token` and the `pos`/`is_at_end`-style cursor follow the teacher's
//! embedded tokenizer in `compiler/src/parser.rs` (`Token { text, line,
//! column }`, `PartialEq<&str>` convenience); this engine promotes it to
//! its own module because the spec counts the Lexer as its own component
//! with its own contract (§4.1), separate from the parser that consumes it.

use std::collections::HashMap;

use jinx_core::casefold::fold_str;
use jinx_core::error::{JinxError, SourcePos};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    NewLine,
    Comma,
    LParen,
    RParen,
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    Ellipsis,
    Colon,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Equals,
    NotEquals,
    Less,
    LessEq,
    Greater,
    GreaterEq,
    And,
    Or,
    Not,
    Identifier,
    StringLiteral,
    IntegerLiteral,
    NumberLiteral,
    BooleanLiteral,
    NullLiteral,
    KwBegin,
    KwEnd,
    KwIf,
    KwElse,
    KwLibrary,
    KwImport,
    KwPublic,
    KwPrivate,
    KwReadonly,
    KwSet,
    KwTo,
    KwFrom,
    KwBy,
    KwOver,
    KwUntil,
    KwWhile,
    KwLoop,
    KwBreak,
    KwReturn,
    KwWait,
    KwIncrement,
    KwDecrement,
    KwErase,
    KwExternal,
    KwAs,
    KwIs,
    KwAsync,
    KwType,
    TypeNumber,
    TypeInteger,
    TypeBoolean,
    TypeString,
    TypeCollection,
    TypeCoroutine,
    TypeFunction,
    TypeGuid,
    TypeObject,
    Eof,
}

/// The literal payload of a literal token, parsed eagerly so the parser
/// never re-parses source text.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Str(String),
    Int(i64),
    Num(f64),
    Bool(bool),
}

#[derive(Debug, Clone)]
pub struct Token {
    pub kind: TokenKind,
    /// Case-folded text for identifiers/keywords; raw text otherwise.
    pub text: String,
    pub literal: Option<Literal>,
    pub line: u32,
    pub column: u32,
}

impl PartialEq<TokenKind> for Token {
    fn eq(&self, other: &TokenKind) -> bool {
        self.kind == *other
    }
}

/// Multi-character operator/keyword text → token kind, the map the lexer's
/// contract (spec §4.1) says it is handed as input.
pub fn keyword_table() -> HashMap<&'static str, TokenKind> {
    use TokenKind::*;
    HashMap::from([
        ("and", And),
        ("or", Or),
        ("not", Not),
        ("begin", KwBegin),
        ("end", KwEnd),
        ("if", KwIf),
        ("else", KwElse),
        ("library", KwLibrary),
        ("import", KwImport),
        ("public", KwPublic),
        ("private", KwPrivate),
        ("readonly", KwReadonly),
        ("set", KwSet),
        ("to", KwTo),
        ("from", KwFrom),
        ("by", KwBy),
        ("over", KwOver),
        ("until", KwUntil),
        ("while", KwWhile),
        ("loop", KwLoop),
        ("break", KwBreak),
        ("return", KwReturn),
        ("wait", KwWait),
        ("increment", KwIncrement),
        ("decrement", KwDecrement),
        ("erase", KwErase),
        ("external", KwExternal),
        ("as", KwAs),
        ("is", KwIs),
        ("async", KwAsync),
        ("type", KwType),
        ("function", TypeFunction),
        ("number", TypeNumber),
        ("integer", TypeInteger),
        ("boolean", TypeBoolean),
        ("string", TypeString),
        ("collection", TypeCollection),
        ("coroutine", TypeCoroutine),
        ("guid", TypeGuid),
        ("object", TypeObject),
    ])
}

/// A scan error (spec §4.1 "Failure semantics"): first error halts, with
/// script name, line, column, and the offending source line rendered with
/// a caret underline.
pub fn render_error(script_name: &str, source: &str, pos: SourcePos, message: &str) -> String {
    let line_text = source.lines().nth((pos.line.saturating_sub(1)) as usize).unwrap_or("");
    let caret_col = pos.column.saturating_sub(1) as usize;
    let caret = format!("{}{}", " ".repeat(caret_col), "^");
    format!("{script_name}:{pos}: {message}\n{line_text}\n{caret}")
}

struct Scanner<'a> {
    chars: Vec<char>,
    pos: usize,
    line: u32,
    column: u32,
    keywords: &'a HashMap<&'static str, TokenKind>,
}

impl<'a> Scanner<'a> {
    fn new(source: &str, keywords: &'a HashMap<&'static str, TokenKind>) -> Self {
        Scanner {
            chars: source.chars().collect(),
            pos: 0,
            line: 1,
            column: 1,
            keywords,
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn is_at_end(&self) -> bool {
        self.pos >= self.chars.len()
    }

    fn advance(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += 1;
        if c == '\t' {
            self.column += 4;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    fn bump_line(&mut self) {
        self.line += 1;
        self.column = 1;
    }

    fn pos_here(&self) -> SourcePos {
        SourcePos::new(self.line, self.column)
    }
}

fn is_structural(c: char) -> bool {
    matches!(
        c,
        '\n' | '\r' | ',' | '(' | ')' | '{' | '}' | '[' | ']' | '"' | '\''
    ) || c.is_whitespace()
        || matches!(c, '+' | '-' | '*' | '/' | '%' | '=' | '!' | '<' | '>')
}

/// Tokenize `source`, returning the full token stream or the first error
/// encountered (spec §4.1: "first error halts").
pub fn tokenize(
    source: &str,
    script_name: &str,
    keywords: &HashMap<&'static str, TokenKind>,
) -> Result<Vec<Token>, JinxError> {
    let mut scanner = Scanner::new(source, keywords);
    let mut tokens = Vec::new();
    let mut prev_kind: Option<TokenKind> = None;
    let mut pending_newline = false;

    macro_rules! push {
        ($kind:expr, $text:expr, $line:expr, $col:expr) => {{
            let kind = $kind;
            tokens.push(Token {
                kind,
                text: $text,
                literal: None,
                line: $line,
                column: $col,
            });
            prev_kind = Some(kind);
        }};
    }

    while !scanner.is_at_end() {
        let c = scanner.peek().unwrap();

        // Whitespace (not newline)
        if c == ' ' || c == '\t' {
            scanner.advance();
            continue;
        }

        // Newlines: \n or \r\n, collapsed when consecutive.
        if c == '\n' || c == '\r' {
            let start_line = scanner.line;
            let start_col = scanner.column;
            if c == '\r' && scanner.peek_at(1) == Some('\n') {
                scanner.advance();
            }
            scanner.advance();
            scanner.bump_line();
            if !pending_newline && !matches!(prev_kind, None | Some(TokenKind::NewLine)) {
                push!(TokenKind::NewLine, "\n".to_string(), start_line, start_col);
            }
            pending_newline = false;
            continue;
        }
        pending_newline = false;

        // Line continuation: "..." + optional whitespace + newline.
        if c == '.' && scanner.peek_at(1) == Some('.') && scanner.peek_at(2) == Some('.') {
            let save_pos = scanner.pos;
            let save_line = scanner.line;
            let save_col = scanner.column;
            scanner.advance();
            scanner.advance();
            scanner.advance();
            while matches!(scanner.peek(), Some(' ') | Some('\t')) {
                scanner.advance();
            }
            match scanner.peek() {
                Some('\n') | Some('\r') => {
                    if scanner.peek() == Some('\r') && scanner.peek_at(1) == Some('\n') {
                        scanner.advance();
                    }
                    scanner.advance();
                    scanner.bump_line();
                    pending_newline = true;
                    continue;
                }
                _ => {
                    // Not actually a continuation: rewind to the ellipsis
                    // and let it be consumed as a structural token.
                    scanner.pos = save_pos;
                    scanner.line = save_line;
                    scanner.column = save_col;
                    scanner.advance();
                    scanner.advance();
                    scanner.advance();
                    push!(TokenKind::Ellipsis, "...".to_string(), save_line, save_col);
                    continue;
                }
            }
        }

        // Comments.
        if c == '-' {
            if scanner.peek_at(1) == Some('-') && scanner.peek_at(2) != Some('-') {
                // Line comment.
                while !scanner.is_at_end() && !matches!(scanner.peek(), Some('\n') | Some('\r')) {
                    scanner.advance();
                }
                continue;
            }
            if scanner.peek_at(1) == Some('-') && scanner.peek_at(2) == Some('-') {
                let open_line = scanner.line;
                let open_col = scanner.column;
                // Consume the opening run of 3+ dashes.
                while scanner.peek() == Some('-') {
                    scanner.advance();
                }
                let mut closed = false;
                while !scanner.is_at_end() {
                    if scanner.peek() == Some('-') && scanner.peek_at(1) == Some('-') && scanner.peek_at(2) == Some('-')
                    {
                        while scanner.peek() == Some('-') {
                            scanner.advance();
                        }
                        closed = true;
                        break;
                    }
                    if matches!(scanner.peek(), Some('\n')) {
                        scanner.advance();
                        scanner.bump_line();
                    } else {
                        scanner.advance();
                    }
                }
                if !closed {
                    return Err(JinxError::syntax(
                        "unclosed block comment",
                        SourcePos::new(open_line, open_col),
                    ));
                }
                continue;
            }
        }

        let tok_line = scanner.line;
        let tok_col = scanner.column;

        // String literal.
        if c == '"' {
            scanner.advance();
            let mut s = String::new();
            loop {
                match scanner.peek() {
                    None | Some('\n') | Some('\r') => {
                        return Err(JinxError::syntax(
                            "unterminated string literal",
                            SourcePos::new(tok_line, tok_col),
                        ));
                    }
                    Some('"') => {
                        scanner.advance();
                        break;
                    }
                    Some(ch) => {
                        s.push(ch);
                        scanner.advance();
                    }
                }
            }
            tokens.push(Token {
                kind: TokenKind::StringLiteral,
                text: s.clone(),
                literal: Some(Literal::Str(s)),
                line: tok_line,
                column: tok_col,
            });
            prev_kind = Some(TokenKind::StringLiteral);
            continue;
        }

        // Quoted identifier: 'free form text'.
        if c == '\'' {
            scanner.advance();
            let mut s = String::new();
            loop {
                match scanner.peek() {
                    None | Some('\n') | Some('\r') => {
                        return Err(JinxError::syntax(
                            "unterminated quoted identifier",
                            SourcePos::new(tok_line, tok_col),
                        ));
                    }
                    Some('\'') => {
                        scanner.advance();
                        break;
                    }
                    Some(ch) => {
                        s.push(ch);
                        scanner.advance();
                    }
                }
            }
            let folded = fold_str(&s);
            tokens.push(Token {
                kind: TokenKind::Identifier,
                text: folded,
                literal: None,
                line: tok_line,
                column: tok_col,
            });
            prev_kind = Some(TokenKind::Identifier);
            continue;
        }

        // Structural single-character tokens.
        match c {
            ',' => {
                scanner.advance();
                push!(TokenKind::Comma, ",".to_string(), tok_line, tok_col);
                continue;
            }
            '(' => {
                scanner.advance();
                push!(TokenKind::LParen, "(".to_string(), tok_line, tok_col);
                continue;
            }
            ')' => {
                scanner.advance();
                push!(TokenKind::RParen, ")".to_string(), tok_line, tok_col);
                continue;
            }
            '{' => {
                scanner.advance();
                push!(TokenKind::LBrace, "{".to_string(), tok_line, tok_col);
                continue;
            }
            '}' => {
                scanner.advance();
                push!(TokenKind::RBrace, "}".to_string(), tok_line, tok_col);
                continue;
            }
            '[' => {
                scanner.advance();
                push!(TokenKind::LBracket, "[".to_string(), tok_line, tok_col);
                continue;
            }
            ']' => {
                scanner.advance();
                push!(TokenKind::RBracket, "]".to_string(), tok_line, tok_col);
                continue;
            }
            ':' => {
                scanner.advance();
                push!(TokenKind::Colon, ":".to_string(), tok_line, tok_col);
                continue;
            }
            _ => {}
        }

        // Operators, with leading sign folded into a following number
        // literal when not in binary-operator position.
        if matches!(c, '+' | '-') {
            let is_binary_position = matches!(
                prev_kind,
                Some(
                    TokenKind::Identifier
                        | TokenKind::IntegerLiteral
                        | TokenKind::NumberLiteral
                        | TokenKind::StringLiteral
                        | TokenKind::BooleanLiteral
                        | TokenKind::RParen
                        | TokenKind::RBracket
                        | TokenKind::RBrace
                )
            );
            let next_is_digit = scanner.peek_at(1).map(|d| d.is_ascii_digit()).unwrap_or(false);
            if next_is_digit && !is_binary_position {
                let (tok, new_line, new_col) = scan_number(&mut scanner, tok_line, tok_col)?;
                tokens.push(tok);
                prev_kind = tokens.last().map(|t| t.kind);
                let _ = (new_line, new_col);
                continue;
            }
            scanner.advance();
            let kind = if c == '+' { TokenKind::Plus } else { TokenKind::Minus };
            push!(kind, c.to_string(), tok_line, tok_col);
            continue;
        }
        if c == '*' {
            scanner.advance();
            push!(TokenKind::Star, "*".to_string(), tok_line, tok_col);
            continue;
        }
        if c == '/' {
            scanner.advance();
            push!(TokenKind::Slash, "/".to_string(), tok_line, tok_col);
            continue;
        }
        if c == '%' {
            scanner.advance();
            push!(TokenKind::Percent, "%".to_string(), tok_line, tok_col);
            continue;
        }
        if c == '=' {
            scanner.advance();
            push!(TokenKind::Equals, "=".to_string(), tok_line, tok_col);
            continue;
        }
        if c == '!' {
            if scanner.peek_at(1) == Some('=') {
                scanner.advance();
                scanner.advance();
                push!(TokenKind::NotEquals, "!=".to_string(), tok_line, tok_col);
                continue;
            }
            return Err(JinxError::syntax("unexpected '!'", SourcePos::new(tok_line, tok_col)));
        }
        if c == '<' {
            scanner.advance();
            if scanner.peek() == Some('=') {
                scanner.advance();
                push!(TokenKind::LessEq, "<=".to_string(), tok_line, tok_col);
            } else {
                push!(TokenKind::Less, "<".to_string(), tok_line, tok_col);
            }
            continue;
        }
        if c == '>' {
            scanner.advance();
            if scanner.peek() == Some('=') {
                scanner.advance();
                push!(TokenKind::GreaterEq, ">=".to_string(), tok_line, tok_col);
            } else {
                push!(TokenKind::Greater, ">".to_string(), tok_line, tok_col);
            }
            continue;
        }

        // Numbers.
        if c.is_ascii_digit() {
            let (tok, _, _) = scan_number(&mut scanner, tok_line, tok_col)?;
            tokens.push(tok);
            prev_kind = tokens.last().map(|t| t.kind);
            continue;
        }

        // Identifiers / keywords.
        if !is_structural(c) {
            let mut s = String::new();
            while let Some(ch) = scanner.peek() {
                if is_structural(ch) {
                    break;
                }
                s.push(ch);
                scanner.advance();
            }
            // Possessive 's suffix, consumed and discarded.
            if scanner.peek() == Some('\'')
                && scanner.peek_at(1) == Some('s')
                && scanner
                    .peek_at(2)
                    .map(|ch| is_structural(ch) || ch.is_whitespace())
                    .unwrap_or(true)
            {
                scanner.advance();
                scanner.advance();
            }
            let folded = fold_str(&s);
            match folded.as_str() {
                "true" => {
                    tokens.push(Token {
                        kind: TokenKind::BooleanLiteral,
                        text: folded,
                        literal: Some(Literal::Bool(true)),
                        line: tok_line,
                        column: tok_col,
                    });
                }
                "false" => {
                    tokens.push(Token {
                        kind: TokenKind::BooleanLiteral,
                        text: folded,
                        literal: Some(Literal::Bool(false)),
                        line: tok_line,
                        column: tok_col,
                    });
                }
                "null" => {
                    tokens.push(Token {
                        kind: TokenKind::NullLiteral,
                        text: folded,
                        literal: None,
                        line: tok_line,
                        column: tok_col,
                    });
                }
                other => {
                    if let Some(&kind) = scanner.keywords.get(other) {
                        tokens.push(Token {
                            kind,
                            text: folded,
                            literal: None,
                            line: tok_line,
                            column: tok_col,
                        });
                    } else {
                        tokens.push(Token {
                            kind: TokenKind::Identifier,
                            text: folded,
                            literal: None,
                            line: tok_line,
                            column: tok_col,
                        });
                    }
                }
            }
            prev_kind = tokens.last().map(|t| t.kind);
            continue;
        }

        return Err(JinxError::syntax(
            format!("unexpected character '{c}'"),
            scanner.pos_here(),
        ));
    }

    // Synthetic trailing NewLine if the program doesn't end with one.
    if !matches!(tokens.last().map(|t| t.kind), None | Some(TokenKind::NewLine)) {
        tokens.push(Token {
            kind: TokenKind::NewLine,
            text: "\n".to_string(),
            literal: None,
            line: scanner.line,
            column: scanner.column,
        });
    }
    tokens.push(Token {
        kind: TokenKind::Eof,
        text: String::new(),
        literal: None,
        line: scanner.line,
        column: scanner.column,
    });

    Ok(tokens)
}

/// Scan a numeric literal: a run of digits with at most one `.`, with an
/// already-confirmed optional leading sign consumed by the caller's
/// position. No locale dependence (always `.` as the decimal point).
fn scan_number(scanner: &mut Scanner, line: u32, col: u32) -> Result<(Token, u32, u32), JinxError> {
    let mut s = String::new();
    if matches!(scanner.peek(), Some('+') | Some('-')) {
        s.push(scanner.advance().unwrap());
    }
    let mut seen_dot = false;
    while let Some(ch) = scanner.peek() {
        if ch.is_ascii_digit() {
            s.push(ch);
            scanner.advance();
        } else if ch == '.' && !seen_dot && scanner.peek_at(1).map(|d| d.is_ascii_digit()).unwrap_or(false) {
            seen_dot = true;
            s.push(ch);
            scanner.advance();
        } else {
            break;
        }
    }
    if seen_dot {
        let v: f64 = s
            .parse()
            .map_err(|_| JinxError::syntax(format!("invalid number literal '{s}'"), SourcePos::new(line, col)))?;
        Ok((
            Token {
                kind: TokenKind::NumberLiteral,
                text: s,
                literal: Some(Literal::Num(v)),
                line,
                column: col,
            },
            line,
            col,
        ))
    } else {
        let v: i64 = s
            .parse()
            .map_err(|_| JinxError::syntax(format!("invalid integer literal '{s}'"), SourcePos::new(line, col)))?;
        Ok((
            Token {
                kind: TokenKind::IntegerLiteral,
                text: s,
                literal: Some(Literal::Int(v)),
                line,
                column: col,
            },
            line,
            col,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn toks(src: &str) -> Vec<Token> {
        let kw = keyword_table();
        tokenize(src, "test", &kw).unwrap()
    }

    #[test]
    fn simple_assignment() {
        let t = toks("set a to 123\n");
        let kinds: Vec<_> = t.iter().map(|tok| tok.kind).collect();
        assert_eq!(
            kinds,
            vec![
                TokenKind::KwSet,
                TokenKind::Identifier,
                TokenKind::KwTo,
                TokenKind::IntegerLiteral,
                TokenKind::NewLine,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn negative_number_vs_binary_minus() {
        let t = toks("set a to -5\n");
        assert!(matches!(t[3].literal, Some(Literal::Int(-5))));

        let t2 = toks("set a to b - 5\n");
        let kinds: Vec<_> = t2.iter().map(|tok| tok.kind).collect();
        assert!(kinds.contains(&TokenKind::Minus));
    }

    #[test]
    fn line_continuation_suppresses_newline() {
        let t = toks("set a to 1 + ...\n2\n");
        let kinds: Vec<_> = t.iter().map(|tok| tok.kind).collect();
        // Only one NewLine (after the whole continued line), then Eof.
        assert_eq!(kinds.iter().filter(|k| **k == TokenKind::NewLine).count(), 1);
    }

    #[test]
    fn unterminated_string_is_syntax_error() {
        let kw = keyword_table();
        let err = tokenize("set a to \"oops\n", "test", &kw).unwrap_err();
        assert!(matches!(err, JinxError::Syntax { .. }));
    }

    #[test]
    fn unclosed_block_comment_is_syntax_error() {
        let kw = keyword_table();
        let err = tokenize("--- never closes\nset a to 1\n", "test", &kw).unwrap_err();
        assert!(matches!(err, JinxError::Syntax { .. }));
    }

    #[test]
    fn case_folding_applies_to_keywords_and_identifiers() {
        let t = toks("SET MyVar TO 1\n");
        assert_eq!(t[0].kind, TokenKind::KwSet);
        assert_eq!(t[1].text, "myvar");
    }

    #[test]
    fn possessive_suffix_is_discarded() {
        let t = toks("set a to it's value\n");
        assert_eq!(t[3].text, "it");
    }

    #[test]
    fn missing_trailing_newline_gets_synthetic_one() {
        let t = toks("set a to 1");
        assert_eq!(t[t.len() - 2].kind, TokenKind::NewLine);
    }
}
