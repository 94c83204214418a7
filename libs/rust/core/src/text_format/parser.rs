//! Schema-checked recursive descent parser for `ModelServerConfig` text format.

use super::error::{ParseError, ParseResult, Position};
use super::escape::unescape;
use super::lexer::{Lexer, SpannedToken, Token};
use super::schema::{FieldKind, FieldSchema, MessageSchema, ScalarKind, MODEL_SERVER_CONFIG};
use crate::document::{Document, Message, Value};

/// Parse text into a registry document.
pub fn parse(source: &str) -> ParseResult<Document> {
    let mut parser = Parser::new(source)?;
    parser.parse_document()
}

/// Parser state
pub struct Parser<'source> {
    source: &'source str,
    lexer: Lexer<'source>,
    current: SpannedToken,
}

impl<'source> Parser<'source> {
    pub fn new(source: &'source str) -> ParseResult<Self> {
        let mut lexer = Lexer::new(source);
        let current = lexer.next_token()?;
        Ok(Self { source, lexer, current })
    }

    fn position(&self) -> Position {
        Position::locate(self.source, self.current.start)
    }

    fn advance(&mut self) -> ParseResult<SpannedToken> {
        let next = self.lexer.next_token()?;
        Ok(std::mem::replace(&mut self.current, next))
    }

    fn check(&self, token: &Token) -> bool {
        std::mem::discriminant(&self.current.token) == std::mem::discriminant(token)
    }

    fn match_token(&mut self, token: &Token) -> ParseResult<bool> {
        if self.check(token) {
            self.advance()?;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    fn consume(&mut self, expected: &Token, what: &str) -> ParseResult<SpannedToken> {
        if self.check(expected) {
            self.advance()
        } else {
            Err(self.unexpected(what))
        }
    }

    fn unexpected(&self, expected: &str) -> ParseError {
        if matches!(self.current.token, Token::Eof) {
            ParseError::UnexpectedEof { expected: expected.to_string() }
        } else {
            ParseError::UnexpectedToken {
                position: self.position(),
                expected: expected.to_string(),
                found: self.current.token.to_string(),
            }
        }
    }

    fn parse_document(&mut self) -> ParseResult<Document> {
        let root = self.parse_fields(&MODEL_SERVER_CONFIG, None)?;
        Ok(Document::new(root))
    }

    /// Fields of one message up to `close` (or end of input for the root).
    fn parse_fields(&mut self, schema: &'static MessageSchema, close: Option<&Token>) -> ParseResult<Message> {
        let mut message = Message::new();
        let mut oneofs_set: Vec<(&'static str, &'static str)> = Vec::new();
        loop {
            match close {
                Some(c) if self.check(c) => {
                    self.advance()?;
                    break;
                }
                None if self.check(&Token::Eof) => break,
                _ => {}
            }

            let position = self.position();
            let name = match &self.current.token {
                Token::Ident(name) => name.clone(),
                _ => {
                    let expected = match close {
                        Some(c) => format!("field name or {}", c),
                        None => "field name".to_string(),
                    };
                    return Err(self.unexpected(&expected));
                }
            };
            let field = schema.field(&name).ok_or_else(|| ParseError::UnknownField {
                position,
                message: schema.name,
                field: name.clone(),
            })?;
            self.advance()?;

            if !field.repeated && message.count(field.name) > 0 {
                return Err(ParseError::DuplicateField { position, message: schema.name, field: field.name });
            }
            if let Some(group) = field.oneof {
                if let Some(&(_, other)) = oneofs_set.iter().find(|(g, f)| *g == group && *f != field.name) {
                    return Err(ParseError::OneofConflict { position, message: schema.name, field: field.name, other });
                }
                oneofs_set.push((group, field.name));
            }

            self.parse_field_value(field, &mut message)?;

            if !self.match_token(&Token::Comma)? {
                self.match_token(&Token::Semicolon)?;
            }
        }
        Ok(message)
    }

    fn parse_field_value(&mut self, field: &'static FieldSchema, message: &mut Message) -> ParseResult<()> {
        match field.kind {
            FieldKind::Message(sub) => {
                let had_colon = self.match_token(&Token::Colon)?;
                if field.repeated && had_colon && self.check(&Token::LBracket) {
                    self.advance()?;
                    if self.match_token(&Token::RBracket)? {
                        return Ok(());
                    }
                    loop {
                        let value = self.parse_message_block(sub)?;
                        message.push(field.name, value);
                        if self.match_token(&Token::RBracket)? {
                            break;
                        }
                        self.consume(&Token::Comma, "`,` or `]`")?;
                    }
                } else {
                    let value = self.parse_message_block(sub)?;
                    message.push(field.name, value);
                }
            }
            FieldKind::Scalar(kind) => {
                self.consume(&Token::Colon, "`:`")?;
                if field.repeated && self.check(&Token::LBracket) {
                    self.advance()?;
                    if self.match_token(&Token::RBracket)? {
                        return Ok(());
                    }
                    loop {
                        let value = self.parse_scalar(field, kind)?;
                        message.push(field.name, value);
                        if self.match_token(&Token::RBracket)? {
                            break;
                        }
                        self.consume(&Token::Comma, "`,` or `]`")?;
                    }
                } else {
                    let value = self.parse_scalar(field, kind)?;
                    message.push(field.name, value);
                }
            }
        }
        Ok(())
    }

    fn parse_message_block(&mut self, schema: &'static MessageSchema) -> ParseResult<Message> {
        if self.match_token(&Token::LBrace)? {
            self.parse_fields(schema, Some(&Token::RBrace))
        } else if self.match_token(&Token::LAngle)? {
            self.parse_fields(schema, Some(&Token::RAngle))
        } else {
            Err(self.unexpected("`{` or `<`"))
        }
    }

    fn parse_scalar(&mut self, field: &'static FieldSchema, kind: ScalarKind) -> ParseResult<Value> {
        match kind {
            ScalarKind::String => self.parse_string().map(Value::String),
            ScalarKind::Int64 => self.parse_integer(field, i64::MIN as i128, i64::MAX as i128),
            ScalarKind::UInt32 => self.parse_integer(field, 0, u32::MAX as i128),
        }
    }

    /// One or more adjacent string literals, concatenated.
    fn parse_string(&mut self) -> ParseResult<String> {
        if !self.check(&Token::String(String::new())) {
            return Err(self.unexpected("string literal"));
        }
        let mut out = String::new();
        while let Token::String(raw) = &self.current.token {
            let position = self.position();
            let decoded = unescape(raw).map_err(|reason| ParseError::InvalidString { position, reason })?;
            out.push_str(&decoded);
            self.advance()?;
        }
        Ok(out)
    }

    fn parse_integer(&mut self, field: &'static FieldSchema, min: i128, max: i128) -> ParseResult<Value> {
        let position = self.position();
        let negative = self.match_token(&Token::Minus)?;
        let digits = match &self.current.token {
            Token::Integer(digits) => digits.clone(),
            Token::Float(text) => {
                return Err(ParseError::InvalidValue {
                    position,
                    field: field.name,
                    reason: format!("expected an integer, found `{}`", text),
                })
            }
            _ => return Err(self.unexpected("integer")),
        };
        self.advance()?;

        let invalid = |reason: String| ParseError::InvalidValue { position, field: field.name, reason };
        if digits.len() > 1 && digits.starts_with('0') && !digits[1..].starts_with(['x', 'X']) {
            return Err(invalid(format!("leading zero in `{}`", digits)));
        }
        let parsed = match digits.strip_prefix("0x").or_else(|| digits.strip_prefix("0X")) {
            Some(hex) => i128::from_str_radix(hex, 16),
            None => digits.parse::<i128>(),
        };
        let magnitude = parsed.map_err(|_| invalid(format!("`{}` is out of range", digits)))?;

        let value = if negative { -magnitude } else { magnitude };
        if value < min || value > max {
            return Err(invalid(format!("{} is out of range [{}, {}]", value, min, max)));
        }
        Ok(Value::Int(value as i64))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(doc: &Document) -> Vec<String> {
        doc.model_configs()
            .filter_map(|m| m.get("name").and_then(Value::as_str).map(str::to_string))
            .collect()
    }

    #[test]
    fn test_parse_model_list() {
        let doc = parse(
            r#"
model_config_list {
  config {
    name: "model_A"
    base_path: "/path/to/model/A/"
  }
  config {
    name: "B"
    base_path: "/path/to/model/B/"
    model_platform: "tensorflow"
  }
}
"#,
        )
        .unwrap();
        assert_eq!(names(&doc), vec!["model_A", "B"]);
    }

    #[test]
    fn test_empty_input_is_empty_document() {
        let doc = parse("  # nothing here\n").unwrap();
        assert!(doc.root().is_empty());
    }

    #[test]
    fn test_alternate_syntax() {
        let doc = parse(
            "model_config_list: < config: [ { name: 'a' 'b', base_path: \"/x\" }, <name: \"c\"; base_path: \"/y\"> ] >",
        )
        .unwrap();
        assert_eq!(names(&doc), vec!["ab", "c"]);
    }

    #[test]
    fn test_version_policy_and_labels() {
        let doc = parse(
            r#"model_config_list { config {
                name: "m" base_path: "/m"
                model_version_policy { specific { versions: [1, 2] versions: 0x10 } }
                version_labels { key: "stable" value: -3 }
            } }"#,
        )
        .unwrap();
        let cfg = doc.model_configs().next().unwrap();
        let policy = cfg.get("model_version_policy").and_then(Value::as_message).unwrap();
        let specific = policy.get("specific").and_then(Value::as_message).unwrap();
        let versions: Vec<i64> = specific.get_all("versions").filter_map(Value::as_int).collect();
        assert_eq!(versions, vec![1, 2, 16]);
        let label = cfg.get("version_labels").and_then(Value::as_message).unwrap();
        assert_eq!(label.get("value").and_then(Value::as_int), Some(-3));
    }

    #[test]
    fn test_unknown_field_rejected() {
        let err = parse("model_config_list { config { name: \"a\" basePath: \"/a\" } }").unwrap_err();
        match err {
            ParseError::UnknownField { message, field, position } => {
                assert_eq!(message, "ModelConfig");
                assert_eq!(field, "basePath");
                assert_eq!(position.line, 1);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_wrong_nesting_rejected() {
        // config belongs inside model_config_list
        let err = parse("config { name: \"a\" }").unwrap_err();
        assert!(matches!(err, ParseError::UnknownField { message: "ModelServerConfig", .. }));
    }

    #[test]
    fn test_wrong_literal_types_rejected() {
        assert!(matches!(
            parse("model_config_list { config { name: 5 } }"),
            Err(ParseError::UnexpectedToken { .. })
        ));
        assert!(matches!(
            parse("model_config_list { config { model_version_policy { latest { num_versions: -1 } } } }"),
            Err(ParseError::InvalidValue { field: "num_versions", .. })
        ));
        assert!(matches!(
            parse("model_config_list { config { model_version_policy { latest { num_versions: 1.5 } } } }"),
            Err(ParseError::InvalidValue { .. })
        ));
        assert!(matches!(
            parse("model_config_list { config { version_labels { key: \"a\" value: 012 } } }"),
            Err(ParseError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_duplicate_singular_field_rejected() {
        let err = parse("model_config_list { config { name: \"a\" name: \"b\" } }").unwrap_err();
        assert!(matches!(err, ParseError::DuplicateField { field: "name", .. }));
    }

    #[test]
    fn test_oneof_conflict_rejected() {
        let err = parse("model_config_list { config { model_version_policy { all {} latest { num_versions: 1 } } } }")
            .unwrap_err();
        assert!(matches!(err, ParseError::OneofConflict { field: "latest", other: "all", .. }));
    }

    #[test]
    fn test_unterminated_message() {
        let err = parse("model_config_list { config { name: \"a\" }").unwrap_err();
        assert!(matches!(err, ParseError::UnexpectedEof { .. }));
    }

    #[test]
    fn test_mismatched_close_rejected() {
        assert!(parse("model_config_list { config < name: \"a\" } }").is_err());
    }
}
