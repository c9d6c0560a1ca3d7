//! Card schema parsing
//!
//! A schema is a short declarative source listing a card's own fields:
//!
//! ```text
//! // fields of a person
//! serializer date
//! contains name: "https://cardstack.com/base/string"
//! containsMany nicknames: "../string"
//! computed contains fullName: "https://cardstack.com/base/string"
//! ```
//!
//! Parsing produces explicit [`FieldDecl`] records; relative target urls are
//! resolved against the url of the card that owns the schema.

use std::collections::HashSet;

use chumsky::input::{Stream, ValueInput};
use chumsky::prelude::*;
use logos::Logos;
use thiserror::Error;

use crate::card::{Cardinality, FieldDecl};
use crate::error::SyntaxError;

/// Errors produced while reading a schema
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SchemaError {
    #[error("schema syntax error: {}", format_errors(.0))]
    Syntax(Vec<SyntaxError>),

    #[error("field '{name}' is declared more than once")]
    DuplicateField { name: String },

    #[error("serializer declared more than once")]
    DuplicateSerializer,
}

fn format_errors(errors: &[SyntaxError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

/// Parsed schema of a single card
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Schema {
    pub fields: Vec<FieldDecl>,
    pub serializer: Option<String>,
}

#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t\n\r]+")]
enum Token {
    #[token("contains")]
    Contains,
    #[token("containsMany")]
    ContainsMany,
    #[token("computed")]
    Computed,
    #[token("serializer")]
    Serializer,
    #[token(":")]
    Colon,

    #[regex(r"[a-zA-Z_][a-zA-Z0-9_]*", |lex| lex.slice().to_string(), priority = 1)]
    Ident(String),

    #[regex(r#""([^"\\]|\\.)*""#, |lex| {
        let s = lex.slice();
        s[1..s.len()-1].to_string()
    })]
    String(String),

    #[regex(r"//[^\n]*", logos::skip)]
    LineComment,
}

fn describe(tok: &Token) -> String {
    match tok {
        Token::Contains => "keyword 'contains'".to_string(),
        Token::ContainsMany => "keyword 'containsMany'".to_string(),
        Token::Computed => "keyword 'computed'".to_string(),
        Token::Serializer => "keyword 'serializer'".to_string(),
        Token::Colon => "':'".to_string(),
        Token::Ident(s) => format!("identifier '{}'", s),
        Token::String(s) => format!("string \"{}\"", s),
        Token::LineComment => "comment".to_string(),
    }
}

#[derive(Debug, Clone)]
enum Item {
    Field {
        name: String,
        cardinality: Cardinality,
        target: String,
        computed: bool,
    },
    Serializer(String),
}

/// Parse a schema source owned by the card at `card_url`
pub fn parse_schema(source: &str, card_url: &str) -> Result<Schema, SchemaError> {
    let mut tokens = Vec::new();
    let mut lex_errors = Vec::new();
    for (tok, span) in Token::lexer(source).spanned() {
        match tok {
            Ok(t) => tokens.push((t, SimpleSpan::from(span))),
            Err(()) => lex_errors.push(SyntaxError::new(
                span.clone(),
                format!("Unexpected character '{}'", &source[span]),
            )),
        }
    }
    if !lex_errors.is_empty() {
        return Err(SchemaError::Syntax(lex_errors));
    }

    let len = source.len();
    let token_stream =
        Stream::from_iter(tokens.into_iter()).map((len..len).into(), |(t, s): (_, _)| (t, s));

    let items = schema_parser()
        .parse(token_stream)
        .into_result()
        .map_err(|errs| {
            SchemaError::Syntax(
                errs.into_iter()
                    .map(|e| SyntaxError::from_rich(e, describe))
                    .collect(),
            )
        })?;

    let mut schema = Schema::default();
    let mut seen = HashSet::new();
    for item in items {
        match item {
            Item::Field {
                name,
                cardinality,
                target,
                computed,
            } => {
                if !seen.insert(name.clone()) {
                    return Err(SchemaError::DuplicateField { name });
                }
                schema.fields.push(FieldDecl {
                    name,
                    cardinality,
                    target_card_url: resolve_card_url(card_url, &target),
                    computed,
                });
            }
            Item::Serializer(name) => {
                if schema.serializer.replace(name).is_some() {
                    return Err(SchemaError::DuplicateSerializer);
                }
            }
        }
    }
    Ok(schema)
}

fn schema_parser<'a, I>() -> impl Parser<'a, I, Vec<Item>, extra::Err<Rich<'a, Token>>> + Clone
where
    I: ValueInput<'a, Token = Token, Span = SimpleSpan>,
{
    let identifier = select! { Token::Ident(s) => s };
    let string_literal = select! { Token::String(s) => s };

    let cardinality = choice((
        just(Token::Contains).to(Cardinality::Contains),
        just(Token::ContainsMany).to(Cardinality::ContainsMany),
    ));

    let field = just(Token::Computed)
        .or_not()
        .then(cardinality)
        .then(identifier)
        .then_ignore(just(Token::Colon))
        .then(string_literal)
        .map(|(((computed, cardinality), name), target)| Item::Field {
            name,
            cardinality,
            target,
            computed: computed.is_some(),
        });

    let serializer = just(Token::Serializer)
        .ignore_then(identifier)
        .map(Item::Serializer);

    choice((serializer, field))
        .repeated()
        .collect::<Vec<_>>()
        .then_ignore(end())
}

/// Resolve a possibly relative card reference against the referring card's url
///
/// Absolute urls are returned unchanged. `./x` and `x` resolve as siblings of
/// the referring card, `../x` walks one more level up.
pub fn resolve_card_url(base: &str, reference: &str) -> String {
    if reference.contains("://") {
        return reference.to_string();
    }

    let (origin, path) = match base.find("://") {
        Some(scheme_end) => {
            let after = scheme_end + 3;
            match base[after..].find('/') {
                Some(slash) => base.split_at(after + slash),
                None => (base, ""),
            }
        }
        None => ("", base),
    };

    let mut segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    // The referring card itself is the last segment
    segments.pop();
    for part in reference.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }
    format!("{}/{}", origin, segments.join("/"))
}

#[cfg(test)]
mod tests {
    use super::*;

    const PERSON: &str = "https://cards.test/person";

    #[test]
    fn test_parse_fields_in_declaration_order() {
        let schema = parse_schema(
            r#"
            // a person
            contains name: "https://cardstack.com/base/string"
            containsMany nicknames: "https://cardstack.com/base/string"
            computed contains fullName: "https://cardstack.com/base/string"
            "#,
            PERSON,
        )
        .expect("Should parse");

        let names: Vec<_> = schema.fields.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["name", "nicknames", "fullName"]);
        assert_eq!(schema.fields[1].cardinality, Cardinality::ContainsMany);
        assert!(schema.fields[2].computed);
        assert!(!schema.fields[0].computed);
        assert_eq!(schema.serializer, None);
    }

    #[test]
    fn test_parse_serializer_directive() {
        let schema = parse_schema("serializer date", "https://cardstack.com/base/date")
            .expect("Should parse");
        assert_eq!(schema.serializer.as_deref(), Some("date"));
        assert!(schema.fields.is_empty());
    }

    #[test]
    fn test_relative_targets_resolve_against_card_url() {
        let schema = parse_schema(r#"contains birthdate: "./date""#, PERSON).expect("Should parse");
        assert_eq!(schema.fields[0].target_card_url, "https://cards.test/date");
    }

    #[test]
    fn test_duplicate_field_rejected() {
        let result = parse_schema(
            r#"contains name: "./string"
               contains name: "./string""#,
            PERSON,
        );
        assert!(matches!(result, Err(SchemaError::DuplicateField { name }) if name == "name"));
    }

    #[test]
    fn test_missing_colon_is_syntax_error() {
        let result = parse_schema(r#"contains name "./string""#, PERSON);
        match result {
            Err(SchemaError::Syntax(errors)) => assert!(!errors.is_empty()),
            other => panic!("Expected syntax error, got {:?}", other),
        }
    }

    #[test]
    fn test_resolve_card_url() {
        assert_eq!(
            resolve_card_url("https://cards.test/a/person", "../base/string"),
            "https://cards.test/base/string"
        );
        assert_eq!(
            resolve_card_url("https://cards.test/person", "date"),
            "https://cards.test/date"
        );
        assert_eq!(
            resolve_card_url("https://cards.test/person", "https://other.test/x"),
            "https://other.test/x"
        );
    }
}
