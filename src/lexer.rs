use crate::error::LexError;
use miette::NamedSource;
use std::sync::Arc;

/// The kinds of tokens the lexer produces. Comments and whitespace are
/// discarded during lexing and never reach the parser.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum TokenKind {
    /// End of the input.
    Eof,
    /// A number literal. The token text preserves the literal exactly so the
    /// evaluator can decide between integer and floating-point later.
    Number,
    /// An identifier: keys, type names, keywords (`new`, `this`, `true`, ...).
    Identifier,
    /// A string literal enclosed in double quotes, escapes already processed.
    DoubleQuotedString,
    /// A string literal enclosed in single quotes, escapes already processed.
    SingleQuotedString,
    /// One of the fixed one-character symbols `[ ] < > ( ) : , { } .`.
    Symbol,
}

/// A token with its kind, processed text and byte span in the source.
/// Tokens compare by (kind, text) for grammar matching.
#[derive(Debug, Clone)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
    pub pos_start: usize,
    pub pos_end: usize,
}

impl Token {
    pub fn new(kind: TokenKind, text: impl Into<String>, pos_start: usize, pos_end: usize) -> Token {
        Token {
            kind,
            text: text.into(),
            pos_start,
            pos_end,
        }
    }

    pub fn is_symbol(&self, s: &str) -> bool {
        self.kind == TokenKind::Symbol && self.text == s
    }

    pub fn is_identifier(&self, s: &str) -> bool {
        self.kind == TokenKind::Identifier && self.text == s
    }
}

const SYMBOLS: &str = "[]<>():,{}.";

pub struct Lexer<'a> {
    source: Arc<NamedSource<String>>,
    chars: std::iter::Peekable<std::str::Chars<'a>>,
    position: usize,
    /// Kind of the last token emitted, used to disambiguate `.` followed by a
    /// digit: after an identifier or number it is a path separator
    /// (`this.prop.0`), otherwise it starts a fractional number (`.5`).
    last_kind: Option<TokenKind>,
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a str, source: Arc<NamedSource<String>>) -> Self {
        Self {
            source,
            chars: input.chars().peekable(),
            position: 0,
            last_kind: None,
        }
    }

    /// Tokenizes the whole input. Fails on the first lexical error; a partial
    /// token stream is never returned.
    pub fn lex(&mut self) -> Result<Vec<Token>, LexError> {
        let mut tokens = Vec::new();
        loop {
            let token = self.next_token()?;
            let done = token.kind == TokenKind::Eof;
            self.last_kind = Some(token.kind);
            tokens.push(token);
            if done {
                break;
            }
        }
        Ok(tokens)
    }

    fn next_token(&mut self) -> Result<Token, LexError> {
        loop {
            let start_pos = self.position;
            let Some(&c) = self.peek() else {
                return Ok(Token::new(TokenKind::Eof, "", start_pos, start_pos));
            };

            // Classification follows a fixed predicate order: quote, number
            // start, whitespace, identifier start, comment, symbol.
            if c == '"' || c == '\'' {
                self.advance();
                return self.read_string(c, start_pos);
            }
            if self.is_number_start(c) {
                return self.read_number(start_pos);
            }
            // A signed identifier covers the non-finite float spellings
            // `-Infinity` and `+Infinity`.
            if (c == '+' || c == '-') && self.peek_second().is_some_and(char::is_alphabetic) {
                self.advance();
                let mut token = self.read_identifier(start_pos);
                token.text.insert(0, c);
                return Ok(token);
            }
            if c.is_whitespace() {
                self.advance();
                continue;
            }
            if c.is_alphabetic() || c == '_' {
                return Ok(self.read_identifier(start_pos));
            }
            if c == '/' {
                self.advance();
                self.skip_comment(start_pos)?;
                continue;
            }
            if SYMBOLS.contains(c) {
                self.advance();
                return Ok(Token::new(TokenKind::Symbol, c, start_pos, self.position));
            }

            self.advance();
            return Err(LexError::UnexpectedCharacter {
                src: (*self.source).clone(),
                span: (start_pos, self.position - start_pos).into(),
                character: c,
            });
        }
    }

    fn is_number_start(&mut self, c: char) -> bool {
        match c {
            '0'..='9' => true,
            '+' | '-' => self
                .peek_second()
                .is_some_and(|n| n.is_ascii_digit() || n == '.'),
            '.' => {
                // A dot after an identifier or number continues a path or a
                // dotted type name; it never starts a number there.
                !matches!(
                    self.last_kind,
                    Some(TokenKind::Identifier | TokenKind::Number)
                ) && self.peek_second().is_some_and(|n| n.is_ascii_digit())
            }
            _ => false,
        }
    }

    fn advance(&mut self) -> Option<char> {
        let c = self.chars.next();
        if let Some(c) = c {
            self.position += c.len_utf8();
        }
        c
    }

    fn peek(&mut self) -> Option<&char> {
        self.chars.peek()
    }

    /// One character past the cursor, without consuming anything.
    fn peek_second(&mut self) -> Option<char> {
        let mut ahead = self.chars.clone();
        ahead.next();
        ahead.next()
    }

    fn skip_comment(&mut self, start_pos: usize) -> Result<(), LexError> {
        match self.peek() {
            Some('/') => {
                // Line comment, runs to end of line.
                while let Some(&c) = self.peek() {
                    if c == '\n' {
                        break;
                    }
                    self.advance();
                }
                Ok(())
            }
            Some('*') => {
                self.advance();
                let mut prev = '\0';
                while let Some(c) = self.advance() {
                    if prev == '*' && c == '/' {
                        return Ok(());
                    }
                    prev = c;
                }
                Err(LexError::UnterminatedComment {
                    src: (*self.source).clone(),
                    span: (start_pos, 2).into(),
                })
            }
            _ => Err(LexError::UnexpectedCharacter {
                src: (*self.source).clone(),
                span: (start_pos, 1).into(),
                character: '/',
            }),
        }
    }

    fn read_string(&mut self, quote: char, start_pos: usize) -> Result<Token, LexError> {
        let mut value = String::new();
        while let Some(&c) = self.peek() {
            if c == quote {
                self.advance();
                let kind = if quote == '"' {
                    TokenKind::DoubleQuotedString
                } else {
                    TokenKind::SingleQuotedString
                };
                return Ok(Token::new(kind, value, start_pos, self.position));
            }
            if c == '\\' {
                self.advance();
                match self.advance() {
                    Some('"') => value.push('"'),
                    Some('\'') => value.push('\''),
                    Some('t') => value.push('\t'),
                    Some('n') => value.push('\n'),
                    Some('\\') => value.push('\\'),
                    // Deliberately lenient: any other escaped character is
                    // passed through verbatim.
                    Some(other) => value.push(other),
                    None => break,
                }
            } else {
                value.push(c);
                self.advance();
            }
        }
        Err(LexError::UnterminatedString {
            src: (*self.source).clone(),
            span: (start_pos, 1).into(),
        })
    }

    fn read_identifier(&mut self, start_pos: usize) -> Token {
        let mut ident = String::new();
        while let Some(&c) = self.peek() {
            if c.is_alphanumeric() || c == '_' {
                ident.push(c);
                self.advance();
            } else {
                break;
            }
        }
        Token::new(TokenKind::Identifier, ident, start_pos, self.position)
    }

    /// Number lexing is a 3-phase state machine: integer part, optional
    /// fractional part, optional signed exponent. A `.` appearing after the
    /// exponent or a second time is fatal.
    fn read_number(&mut self, start_pos: usize) -> Result<Token, LexError> {
        let mut text = String::new();

        if matches!(self.peek(), Some('+') | Some('-')) {
            text.push(self.advance().unwrap());
        }

        let mut seen_dot = false;
        let mut seen_exponent = false;
        while let Some(&c) = self.peek() {
            match c {
                '0'..='9' => {
                    text.push(c);
                    self.advance();
                }
                '.' => {
                    if seen_dot || seen_exponent {
                        text.push(c);
                        self.advance();
                        return Err(self.invalid_number(text, start_pos));
                    }
                    seen_dot = true;
                    text.push(c);
                    self.advance();
                }
                'e' | 'E' => {
                    if seen_exponent {
                        text.push(c);
                        self.advance();
                        return Err(self.invalid_number(text, start_pos));
                    }
                    seen_exponent = true;
                    text.push(c);
                    self.advance();
                    if matches!(self.peek(), Some('+') | Some('-')) {
                        text.push(self.advance().unwrap());
                    }
                }
                _ => break,
            }
        }

        Ok(Token::new(TokenKind::Number, text, start_pos, self.position))
    }

    fn invalid_number(&self, literal: String, start_pos: usize) -> LexError {
        LexError::InvalidNumber {
            src: (*self.source).clone(),
            span: (start_pos, self.position - start_pos).into(),
            literal,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lex(input: &str) -> Vec<Token> {
        let source = Arc::new(NamedSource::new("test.xon", input.to_string()));
        Lexer::new(input, source).lex().expect("lexing failed")
    }

    fn lex_err(input: &str) -> LexError {
        let source = Arc::new(NamedSource::new("test.xon", input.to_string()));
        Lexer::new(input, source).lex().expect_err("lexing succeeded")
    }

    fn kinds_and_texts(tokens: &[Token]) -> Vec<(TokenKind, &str)> {
        tokens.iter().map(|t| (t.kind, t.text.as_str())).collect()
    }

    #[test]
    fn test_eof() {
        let tokens = lex("");
        assert_eq!(kinds_and_texts(&tokens), vec![(TokenKind::Eof, "")]);
    }

    #[test]
    fn test_symbols() {
        let tokens = lex("[]<>():,{}");
        let expected: Vec<(TokenKind, &str)> = "[]<>():,{}"
            .split("")
            .filter(|s| !s.is_empty())
            .map(|s| (TokenKind::Symbol, s))
            .collect();
        assert_eq!(kinds_and_texts(&tokens[..tokens.len() - 1]), expected);
    }

    #[test]
    fn test_numbers() {
        let tokens = lex("123 45.67 -10 +3 .5 1e10 2.5E-3");
        let expected = vec![
            (TokenKind::Number, "123"),
            (TokenKind::Number, "45.67"),
            (TokenKind::Number, "-10"),
            (TokenKind::Number, "+3"),
            (TokenKind::Number, ".5"),
            (TokenKind::Number, "1e10"),
            (TokenKind::Number, "2.5E-3"),
            (TokenKind::Eof, ""),
        ];
        assert_eq!(kinds_and_texts(&tokens), expected);
    }

    #[test]
    fn test_invalid_number_double_dot() {
        assert!(matches!(
            lex_err("1.2.3"),
            LexError::InvalidNumber { .. }
        ));
    }

    #[test]
    fn test_invalid_number_dot_after_exponent() {
        assert!(matches!(
            lex_err("1e3.5"),
            LexError::InvalidNumber { .. }
        ));
    }

    #[test]
    fn test_reference_path_dots_are_symbols() {
        let tokens = lex("this.prop.0");
        let expected = vec![
            (TokenKind::Identifier, "this"),
            (TokenKind::Symbol, "."),
            (TokenKind::Identifier, "prop"),
            (TokenKind::Symbol, "."),
            (TokenKind::Number, "0"),
            (TokenKind::Eof, ""),
        ];
        assert_eq!(kinds_and_texts(&tokens), expected);
    }

    #[test]
    fn test_strings_with_escapes() {
        let tokens = lex(r#""hello \"world\"\t\n" 'single \' quote'"#);
        assert_eq!(tokens[0].kind, TokenKind::DoubleQuotedString);
        assert_eq!(tokens[0].text, "hello \"world\"\t\n");
        assert_eq!(tokens[1].kind, TokenKind::SingleQuotedString);
        assert_eq!(tokens[1].text, "single ' quote");
    }

    #[test]
    fn test_lenient_unknown_escape() {
        let tokens = lex(r#""a\qb""#);
        assert_eq!(tokens[0].text, "aqb");
    }

    #[test]
    fn test_unterminated_string() {
        assert!(matches!(
            lex_err(r#""never ends"#),
            LexError::UnterminatedString { .. }
        ));
    }

    #[test]
    fn test_comments_discarded() {
        let tokens = lex("// line comment\n1 /* block\ncomment */ 2");
        let expected = vec![
            (TokenKind::Number, "1"),
            (TokenKind::Number, "2"),
            (TokenKind::Eof, ""),
        ];
        assert_eq!(kinds_and_texts(&tokens), expected);
    }

    #[test]
    fn test_unterminated_block_comment() {
        assert!(matches!(
            lex_err("/* never closed"),
            LexError::UnterminatedComment { .. }
        ));
    }

    #[test]
    fn test_constructor_expression() {
        let tokens = lex(r#"new My.Lib.Point(1,2){"x":1}"#);
        let expected = vec![
            (TokenKind::Identifier, "new"),
            (TokenKind::Identifier, "My"),
            (TokenKind::Symbol, "."),
            (TokenKind::Identifier, "Lib"),
            (TokenKind::Symbol, "."),
            (TokenKind::Identifier, "Point"),
            (TokenKind::Symbol, "("),
            (TokenKind::Number, "1"),
            (TokenKind::Symbol, ","),
            (TokenKind::Number, "2"),
            (TokenKind::Symbol, ")"),
            (TokenKind::Symbol, "{"),
            (TokenKind::DoubleQuotedString, "x"),
            (TokenKind::Symbol, ":"),
            (TokenKind::Number, "1"),
            (TokenKind::Symbol, "}"),
            (TokenKind::Eof, ""),
        ];
        assert_eq!(kinds_and_texts(&tokens), expected);
    }

    #[test]
    fn test_signed_identifier() {
        let tokens = lex("-Infinity");
        assert_eq!(
            kinds_and_texts(&tokens),
            vec![(TokenKind::Identifier, "-Infinity"), (TokenKind::Eof, "")]
        );
    }

    #[test]
    fn test_unexpected_character() {
        assert!(matches!(
            lex_err("@"),
            LexError::UnexpectedCharacter { character: '@', .. }
        ));
    }
}
