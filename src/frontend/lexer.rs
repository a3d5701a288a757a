use std::{collections::VecDeque, str::Chars};

use itertools::{PeekNth, peek_nth};
use once_cell::sync::Lazy;
use std::collections::BTreeMap;
use strum::EnumString;

use super::{SourceFile, SyntaxError};

#[derive(Debug)]
pub struct Lexer<'source> {
    source: &'source SourceFile,
    position: usize,
    chars: PeekNth<Chars<'source>>,
    peek_buffer: VecDeque<Token>,
}

#[derive(Debug, Clone, Copy)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    /* Words */
    Keyword(Keyword), // don
    Identifier,       // factorial

    /* Literals */
    BooleanLiteral, // shall, shant
    IntegerLiteral, // 1
    FloatLiteral,   // 1.0
    StringLiteral,  // "good morrow, ${name}"

    /* Delimiters */
    OpenParen,    // (
    CloseParen,   // )
    OpenBracket,  // [
    CloseBracket, // ]
    OpenBrace,    // {
    CloseBrace,   // }
    Semicolon,    // ;
    Comma,        // ,
    Colon,        // :
    Arrow,        // ->

    /* Member access and ranges */
    Dot,         // .
    QuestionDot, // ?.
    DotDotLess,  // ..<
    Ellipsis,    // ...

    /* Operators */
    Plus,                 // +
    Minus,                // -
    Asterisk,             // *
    Divide,               // /
    DoubleAsterisk,       // **
    DoubleEquals,         // ==
    NotEquals,            // !=
    LessThan,             // <
    LessThanOrEqualTo,    // <=
    GreaterThan,          // >
    GreaterThanOrEqualTo, // >=
    LogicalAnd,           // &&
    LogicalOr,            // ||
    Question,             // ?
    DoubleQuestion,       // ??
    Equals,               // =
    Increment,            // ++
    Decrement,            // --
}

impl TokenKind {
    pub fn is_comparison_operator(&self) -> bool {
        matches!(
            self,
            Self::DoubleEquals
                | Self::NotEquals
                | Self::LessThan
                | Self::LessThanOrEqualTo
                | Self::GreaterThan
                | Self::GreaterThanOrEqualTo
        )
    }

    pub fn is_term_operator(&self) -> bool {
        matches!(self, Self::Plus | Self::Minus)
    }

    pub fn is_factor_operator(&self) -> bool {
        matches!(self, Self::Asterisk | Self::Divide)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum Keyword {
    Thine,
    Fact,
    Don,
    Object,
    Init,
    Mine,
    Perchance,
    Otherwise,
    Whilst,
    Repeat,
    For,
    In,
    Cease,
    Return,
    Proclaim,
    Some,
    Naught,
    Ne,
}

/// Table of single char tokens (matched after longer sequences are checked for)
static SINGLE_TOKENS: Lazy<BTreeMap<char, TokenKind>> = Lazy::new(|| {
    BTreeMap::from([
        ('(', TokenKind::OpenParen),
        (')', TokenKind::CloseParen),
        ('[', TokenKind::OpenBracket),
        (']', TokenKind::CloseBracket),
        ('{', TokenKind::OpenBrace),
        ('}', TokenKind::CloseBrace),
        (';', TokenKind::Semicolon),
        (',', TokenKind::Comma),
        (':', TokenKind::Colon),
        ('+', TokenKind::Plus),
        ('-', TokenKind::Minus),
        ('*', TokenKind::Asterisk),
        ('/', TokenKind::Divide),
        ('<', TokenKind::LessThan),
        ('>', TokenKind::GreaterThan),
        ('=', TokenKind::Equals),
        ('?', TokenKind::Question),
        ('.', TokenKind::Dot),
    ])
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn to(self, other: Span) -> Span {
        Span::new(self.start, other.end)
    }
}

impl<'source> Lexer<'source> {
    pub fn new(source: &'source SourceFile) -> Self {
        Self::new_in_range(source, Span::new(0, source.contents.len()))
    }

    /// Creates a lexer restricted to a sub-span of the source. Used to re-lex
    /// the embedded expressions of interpolated strings; produced spans stay
    /// absolute within the file.
    pub fn new_in_range(source: &'source SourceFile, range: Span) -> Self {
        Self {
            source,
            chars: peek_nth(source.contents[range.start..range.end].chars()),
            position: range.start,
            peek_buffer: VecDeque::new(),
        }
    }

    pub fn source(&self) -> &'source SourceFile {
        self.source
    }

    fn error_at(&self, start: usize, message: impl Into<String>) -> SyntaxError {
        SyntaxError::new(self.source, Span::new(start, self.position.max(start + 1)), message)
    }

    fn ignore_whitespace(&mut self) {
        while let Some(c) = self.chars.peek().copied() {
            if !c.is_whitespace() {
                break;
            }

            self.chars.next();
            self.position += c.len_utf8();
        }
    }

    fn ignore_line(&mut self) {
        while let Some(c) = self.chars.peek().copied() {
            if c == '\n' {
                break;
            }

            self.chars.next();
            self.position += c.len_utf8();
        }
    }

    fn read_string(&mut self) -> Result<Token, SyntaxError> {
        let start_position = self.position;

        // Consume the opening quote
        assert!(self.chars.next().is_some());
        self.position += 1;

        while let Some(c) = self.chars.peek().copied() {
            if c == '\n' {
                return Err(self.error_at(
                    start_position,
                    "Reached end of line while reading string literal",
                ));
            }

            self.chars.next();
            self.position += c.len_utf8();

            // Skip the character following a backslash so `\"` does not
            // terminate the literal
            if c == '\\'
                && let Some(escaped) = self.chars.peek().copied()
            {
                self.chars.next();
                self.position += escaped.len_utf8();
                continue;
            }

            if c == '"' {
                return Ok(Token {
                    span: self.new_span(start_position),
                    kind: TokenKind::StringLiteral,
                });
            }
        }

        Err(self.error_at(
            start_position,
            "Reached end of file while reading string literal",
        ))
    }

    // Keyword, identifier, or boolean literal
    fn read_word(&mut self) -> Token {
        let start_position = self.position;

        while let Some(c) = self.chars.peek().copied() {
            if !(c.is_alphanumeric() || c == '_') {
                break;
            }

            self.chars.next();
            self.position += c.len_utf8();
        }

        let span = self.new_span(start_position);
        let value = self.source.value_of_span(span);

        let kind = if let Ok(keyword) = value.parse() {
            TokenKind::Keyword(keyword)
        } else {
            match value {
                "shall" | "shant" => TokenKind::BooleanLiteral,
                _ => TokenKind::Identifier,
            }
        };

        Token { kind, span }
    }

    fn read_number(&mut self) -> Token {
        let start_position = self.position;
        let mut kind = TokenKind::IntegerLiteral;

        while let Some(c) = self.chars.peek().copied() {
            // A dot only continues the number when a digit follows, so that
            // `1..<9` lexes as `1`, `..<`, `9`
            if c == '.' && self.chars.peek_nth(1).is_some_and(|c| c.is_ascii_digit()) {
                kind = TokenKind::FloatLiteral;
                self.chars.next();
                self.position += 1;
                continue;
            }

            if !c.is_ascii_digit() {
                break;
            }

            self.chars.next();
            self.position += 1;
        }

        Token {
            kind,
            span: self.new_span(start_position),
        }
    }

    fn read_single(&mut self, kind: TokenKind) -> Token {
        let start_position = self.position;

        self.chars.next();
        self.position += 1;

        Token {
            kind,
            span: self.new_span(start_position),
        }
    }

    fn read_double(&mut self, kind: TokenKind) -> Token {
        let start_position = self.position;

        self.chars.next();
        self.chars.next();
        self.position += 2;

        Token {
            kind,
            span: self.new_span(start_position),
        }
    }

    fn read_triple(&mut self, kind: TokenKind) -> Token {
        let start_position = self.position;

        self.chars.next();
        self.chars.next();
        self.chars.next();
        self.position += 3;

        Token {
            kind,
            span: self.new_span(start_position),
        }
    }

    fn new_span(&self, start: usize) -> Span {
        Span {
            start,
            end: self.position,
        }
    }

    pub fn peek(&mut self) -> Result<Option<Token>, SyntaxError> {
        if !self.peek_buffer.is_empty() {
            return Ok(self.peek_buffer.front().copied());
        }

        if let Some(token) = self.next()? {
            self.peek_buffer.push_back(token);
        }

        Ok(self.peek_buffer.front().copied())
    }

    #[allow(clippy::should_implement_trait)]
    pub fn next(&mut self) -> Result<Option<Token>, SyntaxError> {
        if let Some(token) = self.peek_buffer.pop_front() {
            return Ok(Some(token));
        }

        self.next_from_chars()
    }

    fn next_from_chars(&mut self) -> Result<Option<Token>, SyntaxError> {
        while let Some(c) = self.chars.peek().copied() {
            let token = match c {
                // Ignore whitespace
                c if c.is_whitespace() => {
                    self.ignore_whitespace();
                    continue;
                }
                // Ignore comments
                '/' if self.chars.peek_nth(1).is_some_and(|c| *c == '/') => {
                    self.ignore_line();
                    continue;
                }

                // String literals (interpolations are split out by the parser)
                '"' => self.read_string()?,

                // Integer and float literals
                n if n.is_ascii_digit() => self.read_number(),

                // Identifiers, keywords, and boolean literals
                a if a.is_alphabetic() || a == '_' => self.read_word(),

                // Arrow (->)
                '-' if self.chars.peek_nth(1).is_some_and(|c| *c == '>') => {
                    self.read_double(TokenKind::Arrow)
                }
                // Decrement (--)
                '-' if self.chars.peek_nth(1).is_some_and(|c| *c == '-') => {
                    self.read_double(TokenKind::Decrement)
                }
                // Increment (++)
                '+' if self.chars.peek_nth(1).is_some_and(|c| *c == '+') => {
                    self.read_double(TokenKind::Increment)
                }

                // Power (**)
                '*' if self.chars.peek_nth(1).is_some_and(|c| *c == '*') => {
                    self.read_double(TokenKind::DoubleAsterisk)
                }

                // Double equals (==)
                '=' if self.chars.peek_nth(1).is_some_and(|c| *c == '=') => {
                    self.read_double(TokenKind::DoubleEquals)
                }
                // Not equals (!=)
                '!' if self.chars.peek_nth(1).is_some_and(|c| *c == '=') => {
                    self.read_double(TokenKind::NotEquals)
                }
                // Less than or equal (<=)
                '<' if self.chars.peek_nth(1).is_some_and(|c| *c == '=') => {
                    self.read_double(TokenKind::LessThanOrEqualTo)
                }
                // Greater than or equal (>=)
                '>' if self.chars.peek_nth(1).is_some_and(|c| *c == '=') => {
                    self.read_double(TokenKind::GreaterThanOrEqualTo)
                }

                // Logical and (&&)
                '&' if self.chars.peek_nth(1).is_some_and(|c| *c == '&') => {
                    self.read_double(TokenKind::LogicalAnd)
                }
                // Logical or (||)
                '|' if self.chars.peek_nth(1).is_some_and(|c| *c == '|') => {
                    self.read_double(TokenKind::LogicalOr)
                }

                // Nil coalescing (??)
                '?' if self.chars.peek_nth(1).is_some_and(|c| *c == '?') => {
                    self.read_double(TokenKind::DoubleQuestion)
                }
                // Optional member access (?.)
                '?' if self.chars.peek_nth(1).is_some_and(|c| *c == '.') => {
                    self.read_double(TokenKind::QuestionDot)
                }

                // Inclusive range (...)
                '.' if self.chars.peek_nth(1).is_some_and(|c| *c == '.')
                    && self.chars.peek_nth(2).is_some_and(|c| *c == '.') =>
                {
                    self.read_triple(TokenKind::Ellipsis)
                }
                // Exclusive range (..<)
                '.' if self.chars.peek_nth(1).is_some_and(|c| *c == '.')
                    && self.chars.peek_nth(2).is_some_and(|c| *c == '<') =>
                {
                    self.read_triple(TokenKind::DotDotLess)
                }

                s if SINGLE_TOKENS.contains_key(&s) => {
                    self.read_single(*SINGLE_TOKENS.get(&s).unwrap())
                }
                c => {
                    return Err(
                        self.error_at(self.position, format!("Unexpected character `{c}`"))
                    );
                }
            };

            return Ok(Some(token));
        }

        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        let source = SourceFile::new_in_memory(source);
        let mut lexer = Lexer::new(&source);
        let mut kinds = Vec::new();

        while let Some(token) = lexer.next().expect("lexing should succeed") {
            kinds.push(token.kind);
        }

        kinds
    }

    #[test]
    fn lexes_declaration() {
        assert_eq!(
            kinds("thine x: int = 1;"),
            vec![
                TokenKind::Keyword(Keyword::Thine),
                TokenKind::Identifier,
                TokenKind::Colon,
                TokenKind::Identifier,
                TokenKind::Equals,
                TokenKind::IntegerLiteral,
                TokenKind::Semicolon,
            ]
        );
    }

    #[test]
    fn range_operators_do_not_eat_integer_bounds() {
        assert_eq!(
            kinds("1..<9"),
            vec![
                TokenKind::IntegerLiteral,
                TokenKind::DotDotLess,
                TokenKind::IntegerLiteral,
            ]
        );
        assert_eq!(
            kinds("1...9"),
            vec![
                TokenKind::IntegerLiteral,
                TokenKind::Ellipsis,
                TokenKind::IntegerLiteral,
            ]
        );
    }

    #[test]
    fn floats_and_members_disambiguate() {
        assert_eq!(kinds("1.5"), vec![TokenKind::FloatLiteral]);
        assert_eq!(
            kinds("p.x"),
            vec![TokenKind::Identifier, TokenKind::Dot, TokenKind::Identifier]
        );
        assert_eq!(
            kinds("p?.x"),
            vec![
                TokenKind::Identifier,
                TokenKind::QuestionDot,
                TokenKind::Identifier
            ]
        );
    }

    #[test]
    fn booleans_are_literals_not_keywords() {
        assert_eq!(
            kinds("shall shant ne"),
            vec![
                TokenKind::BooleanLiteral,
                TokenKind::BooleanLiteral,
                TokenKind::Keyword(Keyword::Ne),
            ]
        );
    }

    #[test]
    fn unterminated_string_is_a_syntax_error() {
        let source = SourceFile::new_in_memory("\"ohno");
        let mut lexer = Lexer::new(&source);
        assert!(lexer.next().is_err());
    }

    #[test]
    fn comments_are_skipped() {
        assert_eq!(
            kinds("1 // the rest is commentary ++ -- ??\n2"),
            vec![TokenKind::IntegerLiteral, TokenKind::IntegerLiteral]
        );
    }
}
