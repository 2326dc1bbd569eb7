use crate::ast::{Expression, ExpressionKind, PathSegment};
use crate::error::{ParseError, XonError};
use crate::lexer::{Lexer, Token, TokenKind};
use crate::typespec::TypeSpecifier;
use miette::NamedSource;
use std::sync::Arc;

/// A recursive descent parser for the notation, one token of lookahead. It
/// performs no type binding beyond attaching unresolved type specifiers.
#[derive(Debug)]
pub struct Parser {
    source: Arc<NamedSource<String>>,
    tokens: Vec<Token>,
    position: usize,
    source_len: usize,
}

impl Parser {
    pub fn new(source_text: &str) -> Result<Self, XonError> {
        Self::new_with_name(source_text, "source.xon".to_string())
    }

    pub fn new_with_name(source_text: &str, name: String) -> Result<Self, XonError> {
        let source = Arc::new(NamedSource::new(name, source_text.to_string()));
        let tokens = Lexer::new(source_text, source.clone()).lex()?;
        Ok(Self {
            source,
            tokens,
            position: 0,
            source_len: source_text.len(),
        })
    }

    pub fn source(&self) -> Arc<NamedSource<String>> {
        self.source.clone()
    }

    /// Document ::= Value EOF
    pub fn parse_document(&mut self) -> Result<Expression, XonError> {
        let value = self.parse_value()?;
        let token = self.current_token()?;
        if token.kind != TokenKind::Eof {
            return self.err_unexpected("end of input");
        }
        Ok(value)
    }

    /// Value ::= Null | Boolean | Number | String | Array | Object
    ///         | Cast | Constructor | Reference
    pub fn parse_value(&mut self) -> Result<Expression, XonError> {
        let token = self.current_token()?.clone();
        match token.kind {
            TokenKind::Identifier => match token.text.as_str() {
                "null" => {
                    self.advance();
                    Ok(Expression::new(
                        ExpressionKind::Null,
                        token.pos_start,
                        token.pos_end,
                    ))
                }
                "true" | "false" => {
                    self.advance();
                    Ok(Expression::new(
                        ExpressionKind::Boolean(token.text == "true"),
                        token.pos_start,
                        token.pos_end,
                    ))
                }
                "this" => self.parse_reference(),
                "new" => self.parse_constructor(),
                // Any other bare identifier is a deferred-typed scalar.
                _ => {
                    self.advance();
                    Ok(Expression::new(
                        ExpressionKind::Scalar(token.text),
                        token.pos_start,
                        token.pos_end,
                    ))
                }
            },
            TokenKind::Number => {
                self.advance();
                Ok(Expression::new(
                    ExpressionKind::Numeric(token.text),
                    token.pos_start,
                    token.pos_end,
                ))
            }
            TokenKind::DoubleQuotedString | TokenKind::SingleQuotedString => {
                self.advance();
                Ok(Expression::new(
                    ExpressionKind::Scalar(token.text),
                    token.pos_start,
                    token.pos_end,
                ))
            }
            TokenKind::Symbol => match token.text.as_str() {
                "[" => self.parse_list(),
                "{" => self.parse_object(),
                "(" => self.parse_cast(),
                _ => self.err_unexpected("a value"),
            },
            TokenKind::Eof => self.err_unexpected("a value"),
        }
    }

    /// Array ::= "[" [ Value { "," Value } [ "," ] ] "]"
    fn parse_list(&mut self) -> Result<Expression, XonError> {
        let start = self.current_token()?.pos_start;
        self.expect_symbol("[")?;
        let items = self.parse_comma_separated("]", Self::parse_value)?;
        let end = self.current_token()?.pos_end;
        self.expect_symbol("]")?;
        Ok(Expression::new(ExpressionKind::List(items), start, end))
    }

    /// Object ::= "{" [ Member { "," Member } [ "," ] ] "}"
    /// Member ::= Value ":" Value
    fn parse_object(&mut self) -> Result<Expression, XonError> {
        let start = self.current_token()?.pos_start;
        self.expect_symbol("{")?;
        let members = self.parse_comma_separated("}", |p| {
            let key = p.parse_value()?;
            p.expect_symbol(":")?;
            let value = p.parse_value()?;
            Ok((key, value))
        })?;
        let end = self.current_token()?.pos_end;
        self.expect_symbol("}")?;
        Ok(Expression::new(ExpressionKind::Object(members), start, end))
    }

    /// Cast ::= "(" TypeSpecifier ")" Value
    ///
    /// The innermost cast wins: a result type already bound on the inner
    /// expression is left in place.
    fn parse_cast(&mut self) -> Result<Expression, XonError> {
        let start = self.current_token()?.pos_start;
        self.expect_symbol("(")?;
        let spec = self.parse_type_specifier()?;
        self.expect_symbol(")")?;
        let mut inner = self.parse_value()?;
        if inner.result_type.is_none() {
            inner.result_type = Some(spec);
        }
        inner.pos_start = start;
        Ok(inner)
    }

    /// Constructor ::= "new" TypeSpecifier "(" [ Value { "," Value } ] ")"
    ///                 [ Object | Array ]
    ///
    /// A missing body defaults to an empty object.
    fn parse_constructor(&mut self) -> Result<Expression, XonError> {
        let start = self.current_token()?.pos_start;
        self.expect_identifier("new")?;
        let spec = self.parse_type_specifier()?;
        self.expect_symbol("(")?;
        let args = self.parse_comma_separated(")", Self::parse_value)?;
        let mut end = self.current_token()?.pos_end;
        self.expect_symbol(")")?;

        let mut body = if self.check_symbol("{") {
            self.parse_object()?
        } else if self.check_symbol("[") {
            self.parse_list()?
        } else {
            Expression::new(ExpressionKind::Object(Vec::new()), start, end)
        };
        end = end.max(body.pos_end);

        body.result_type = Some(spec);
        body.constructor_args = args;
        body.pos_start = start;
        body.pos_end = end;
        Ok(body)
    }

    /// Reference ::= "this" { "." ( Identifier | Integer ) }
    fn parse_reference(&mut self) -> Result<Expression, XonError> {
        let start = self.current_token()?.pos_start;
        let mut end = self.current_token()?.pos_end;
        self.expect_identifier("this")?;

        let mut segments = Vec::new();
        while self.match_symbol(".") {
            let token = self.current_token()?.clone();
            match token.kind {
                TokenKind::Identifier => {
                    segments.push(PathSegment::Property(token.text.clone()));
                }
                TokenKind::Number => {
                    let index: usize = token
                        .text
                        .parse()
                        .map_err(|_| self.unexpected_here("an integer index", &token))?;
                    segments.push(PathSegment::Index(index));
                }
                _ => return self.err_unexpected("a property name or index"),
            }
            end = token.pos_end;
            self.advance();
        }

        Ok(Expression::new(
            ExpressionKind::Reference(segments),
            start,
            end,
        ))
    }

    /// TypeSpecifier ::= DottedName [ "<" TypeSpecifier { "," TypeSpecifier } ">" ]
    ///                   [ "[" "]" ]
    pub fn parse_type_specifier(&mut self) -> Result<TypeSpecifier, XonError> {
        let first = self.current_token()?.clone();
        if first.kind != TokenKind::Identifier {
            return self.err_unexpected("a type name");
        }
        self.advance();

        let mut name = first.text.clone();
        let mut end = first.pos_end;
        while self.check_symbol(".") && self.peek_kind(1) == Some(TokenKind::Identifier) {
            self.advance();
            let part = self.current_token()?.clone();
            name.push('.');
            name.push_str(&part.text);
            end = part.pos_end;
            self.advance();
        }

        let mut spec = TypeSpecifier::simple(name, first.pos_start, end);

        if self.match_symbol("<") {
            spec.generic_args =
                self.parse_comma_separated(">", Self::parse_type_specifier)?;
            spec.pos_end = self.current_token()?.pos_end;
            self.expect_symbol(">")?;
        }

        // A trailing `[]` marks array rank; `[` followed by anything else
        // belongs to a constructor's initializer body.
        while self.check_symbol("[") && self.peek_is_symbol(1, "]") {
            self.advance();
            spec.pos_end = self.current_token()?.pos_end;
            self.advance();
            spec.array_rank += 1;
        }

        Ok(spec)
    }

    /// Reads zero or more comma-separated items until the terminator symbol,
    /// allowing a trailing comma. The terminator itself is not consumed.
    fn parse_comma_separated<T>(
        &mut self,
        terminator: &str,
        mut item: impl FnMut(&mut Self) -> Result<T, XonError>,
    ) -> Result<Vec<T>, XonError> {
        let mut items = Vec::new();
        loop {
            if self.check_symbol(terminator) {
                break;
            }
            items.push(item(self)?);
            if !self.match_symbol(",") {
                break;
            }
        }
        Ok(items)
    }

    // === Token cursor helpers ===

    fn current_token(&self) -> Result<&Token, XonError> {
        self.tokens.get(self.position).ok_or_else(|| {
            ParseError::UnexpectedEof {
                src: (*self.source).clone(),
                span: (self.source_len.saturating_sub(1), 0).into(),
            }
            .into()
        })
    }

    fn peek_kind(&self, offset: usize) -> Option<TokenKind> {
        self.tokens.get(self.position + offset).map(|t| t.kind)
    }

    fn peek_is_symbol(&self, offset: usize, s: &str) -> bool {
        self.tokens
            .get(self.position + offset)
            .is_some_and(|t| t.is_symbol(s))
    }

    fn advance(&mut self) {
        if self.position < self.tokens.len() {
            self.position += 1;
        }
    }

    fn check_symbol(&self, s: &str) -> bool {
        self.current_token().map(|t| t.is_symbol(s)).unwrap_or(false)
    }

    fn match_symbol(&mut self, s: &str) -> bool {
        if self.check_symbol(s) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect_symbol(&mut self, s: &str) -> Result<(), XonError> {
        if self.match_symbol(s) {
            Ok(())
        } else {
            self.err_unexpected(&format!("'{s}'"))
        }
    }

    fn expect_identifier(&mut self, s: &str) -> Result<(), XonError> {
        if self.current_token()?.is_identifier(s) {
            self.advance();
            Ok(())
        } else {
            self.err_unexpected(&format!("'{s}'"))
        }
    }

    fn err_unexpected<T>(&self, expected: &str) -> Result<T, XonError> {
        let token = self.current_token()?;
        if token.kind == TokenKind::Eof {
            return Err(ParseError::UnexpectedEof {
                src: (*self.source).clone(),
                span: (token.pos_start, 0).into(),
            }
            .into());
        }
        Err(ParseError::UnexpectedToken {
            src: (*self.source).clone(),
            span: (token.pos_start, token.pos_end - token.pos_start).into(),
            expected: expected.to_string(),
        }
        .into())
    }

    fn unexpected_here(&self, expected: &str, token: &Token) -> XonError {
        ParseError::UnexpectedToken {
            src: (*self.source).clone(),
            span: (token.pos_start, token.pos_end - token.pos_start).into(),
            expected: expected.to_string(),
        }
        .into()
    }
}
