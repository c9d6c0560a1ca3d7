//! Template lexer
//!
//! Templates mix free text with two kinds of structured islands: mustaches
//! (`{{ ... }}`) and tags (`<name ...>`, `</name>`). A scanner splits the
//! source into text runs and islands; each island is then tokenized with
//! logos. Mustache comments (`{{! ... }}`, `{{!-- ... --}}`) are dropped.

use logos::Logos;

use crate::error::{Span, SyntaxError};

/// Tokens inside mustaches and tags
#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t\n\r]+")]
enum Lexeme {
    #[token("{{#")]
    OpenBlock,
    #[token("{{/")]
    OpenEndBlock,
    #[token("{{")]
    OpenMustache,
    #[token("}}")]
    CloseMustache,
    #[token("</")]
    OpenEndTag,
    #[token("<")]
    OpenTag,
    #[token("/>")]
    SelfClose,
    #[token(">")]
    CloseTag,
    #[token("(")]
    ParenOpen,
    #[token(")")]
    ParenClose,
    #[token("|")]
    Pipe,
    #[token("=")]
    Equals,

    #[token("as")]
    As,
    #[token("else")]
    Else,
    #[token("true")]
    True,
    #[token("false")]
    False,

    // Dotted paths, optionally `@`-prefixed: `@model.name`, `Fields.title`, `each-in`
    #[regex(r"@?[a-zA-Z_][a-zA-Z0-9_\-]*(\.[a-zA-Z_][a-zA-Z0-9_\-]*)*", |lex| lex.slice().to_string(), priority = 1)]
    Path(String),

    #[regex(r#""([^"\\]|\\.)*""#, |lex| unquote(lex.slice()))]
    #[regex(r#"'([^'\\]|\\.)*'"#, |lex| unquote(lex.slice()))]
    String(String),

    #[regex(r"-?[0-9]+(\.[0-9]+)?", |lex| lex.slice().parse::<f64>().ok())]
    Number(f64),
}

fn unquote(s: &str) -> String {
    let inner = &s[1..s.len() - 1];
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(escaped) = chars.next() {
                out.push(escaped);
            }
        } else {
            out.push(c);
        }
    }
    out
}

/// Tokens consumed by the template grammar
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    /// A run of literal text between islands
    Text(String),
    OpenBlock,
    OpenEndBlock,
    OpenMustache,
    CloseMustache,
    OpenEndTag,
    OpenTag,
    SelfClose,
    CloseTag,
    ParenOpen,
    ParenClose,
    Pipe,
    Equals,
    As,
    Else,
    True,
    False,
    Path(String),
    String(String),
    Number(f64),
}

impl From<Lexeme> for Token {
    fn from(lexeme: Lexeme) -> Self {
        match lexeme {
            Lexeme::OpenBlock => Token::OpenBlock,
            Lexeme::OpenEndBlock => Token::OpenEndBlock,
            Lexeme::OpenMustache => Token::OpenMustache,
            Lexeme::CloseMustache => Token::CloseMustache,
            Lexeme::OpenEndTag => Token::OpenEndTag,
            Lexeme::OpenTag => Token::OpenTag,
            Lexeme::SelfClose => Token::SelfClose,
            Lexeme::CloseTag => Token::CloseTag,
            Lexeme::ParenOpen => Token::ParenOpen,
            Lexeme::ParenClose => Token::ParenClose,
            Lexeme::Pipe => Token::Pipe,
            Lexeme::Equals => Token::Equals,
            Lexeme::As => Token::As,
            Lexeme::Else => Token::Else,
            Lexeme::True => Token::True,
            Lexeme::False => Token::False,
            Lexeme::Path(p) => Token::Path(p),
            Lexeme::String(s) => Token::String(s),
            Lexeme::Number(n) => Token::Number(n),
        }
    }
}

/// Format a token for human-readable error messages
pub fn format_token(tok: &Token) -> String {
    match tok {
        Token::Text(t) => format!("text \"{}\"", t.trim()),
        Token::OpenBlock => "'{{#'".to_string(),
        Token::OpenEndBlock => "'{{/'".to_string(),
        Token::OpenMustache => "'{{'".to_string(),
        Token::CloseMustache => "'}}'".to_string(),
        Token::OpenEndTag => "'</'".to_string(),
        Token::OpenTag => "'<'".to_string(),
        Token::SelfClose => "'/>'".to_string(),
        Token::CloseTag => "'>'".to_string(),
        Token::ParenOpen => "'('".to_string(),
        Token::ParenClose => "')'".to_string(),
        Token::Pipe => "'|'".to_string(),
        Token::Equals => "'='".to_string(),
        Token::As => "keyword 'as'".to_string(),
        Token::Else => "keyword 'else'".to_string(),
        Token::True => "'true'".to_string(),
        Token::False => "'false'".to_string(),
        Token::Path(p) => format!("path '{}'", p),
        Token::String(s) => format!("string \"{}\"", s),
        Token::Number(n) => format!("number {}", n),
    }
}

/// Lex a template source into tokens with spans
///
/// The scanner steps over bytes and only compares against ASCII markers, so
/// text runs and islands always start and end on character boundaries.
pub fn lex(source: &str) -> Result<Vec<(Token, Span)>, Vec<SyntaxError>> {
    let bytes = source.as_bytes();
    let mut tokens = Vec::new();
    let mut errors = Vec::new();
    let mut text_start = 0;
    let mut i = 0;

    while i < bytes.len() {
        let island_end = if bytes[i..].starts_with(b"{{!") {
            match comment_end(source, i) {
                Some(end) => {
                    push_text(&mut tokens, source, text_start, i);
                    i = end;
                    text_start = end;
                    continue;
                }
                None => {
                    errors.push(SyntaxError::new(i..source.len(), "Unclosed comment"));
                    break;
                }
            }
        } else if bytes[i..].starts_with(b"{{") {
            Some(mustache_end(source, i).ok_or("Unclosed mustache"))
        } else if bytes[i] == b'<' && starts_tag(bytes, i) {
            Some(tag_end(source, i).ok_or("Unclosed tag"))
        } else {
            None
        };

        match island_end {
            None => i += 1,
            Some(Ok(end)) => {
                push_text(&mut tokens, source, text_start, i);
                lex_island(source, i, end, &mut tokens, &mut errors);
                i = end;
                text_start = end;
            }
            Some(Err(message)) => {
                errors.push(SyntaxError::new(i..source.len(), message));
                break;
            }
        }
    }

    if errors.is_empty() {
        push_text(&mut tokens, source, text_start, source.len());
        Ok(tokens)
    } else {
        Err(errors)
    }
}

fn push_text(tokens: &mut Vec<(Token, Span)>, source: &str, start: usize, end: usize) {
    if start < end {
        tokens.push((Token::Text(source[start..end].to_string()), start..end));
    }
}

fn lex_island(
    source: &str,
    start: usize,
    end: usize,
    tokens: &mut Vec<(Token, Span)>,
    errors: &mut Vec<SyntaxError>,
) {
    for (lexeme, span) in Lexeme::lexer(&source[start..end]).spanned() {
        let span = (span.start + start)..(span.end + start);
        match lexeme {
            Ok(l) => tokens.push((l.into(), span)),
            Err(()) => errors.push(SyntaxError::new(
                span.clone(),
                format!("Unexpected character '{}'", &source[span]),
            )),
        }
    }
}

/// `<` opens a tag only when followed by a name, `@` or `/`
fn starts_tag(bytes: &[u8], i: usize) -> bool {
    match bytes.get(i + 1) {
        Some(b) => b.is_ascii_alphabetic() || *b == b'@' || *b == b'/',
        None => false,
    }
}

/// End offset (exclusive) of the mustache starting at `start`
fn mustache_end(source: &str, start: usize) -> Option<usize> {
    let bytes = source.as_bytes();
    let mut quote: Option<u8> = None;
    let mut i = start + 2;
    while i < bytes.len() {
        let b = bytes[i];
        match quote {
            Some(_) if b == b'\\' => i += 1,
            Some(q) if b == q => quote = None,
            Some(_) => {}
            None if b == b'"' || b == b'\'' => quote = Some(b),
            None if bytes[i..].starts_with(b"}}") => return Some(i + 2),
            None => {}
        }
        i += 1;
    }
    None
}

/// End offset (exclusive) of the tag starting at `start`
fn tag_end(source: &str, start: usize) -> Option<usize> {
    let bytes = source.as_bytes();
    let mut quote: Option<u8> = None;
    let mut i = start + 1;
    while i < bytes.len() {
        let b = bytes[i];
        match quote {
            Some(_) if b == b'\\' => i += 1,
            Some(q) if b == q => quote = None,
            Some(_) => {}
            None if b == b'"' || b == b'\'' => quote = Some(b),
            None if bytes[i..].starts_with(b"{{") => {
                i = mustache_end(source, i)?;
                continue;
            }
            None if b == b'>' => return Some(i + 1),
            None => {}
        }
        i += 1;
    }
    None
}

fn comment_end(source: &str, start: usize) -> Option<usize> {
    let terminator = if source[start..].starts_with("{{!--") {
        "--}}"
    } else {
        "}}"
    };
    source[start + 3..]
        .find(terminator)
        .map(|offset| start + 3 + offset + terminator.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<Token> {
        lex(source)
            .expect("Should lex")
            .into_iter()
            .map(|(t, _)| t)
            .collect()
    }

    #[test]
    fn test_text_and_mustache() {
        assert_eq!(
            kinds("Hello {{@model.name}}!"),
            vec![
                Token::Text("Hello ".to_string()),
                Token::OpenMustache,
                Token::Path("@model.name".to_string()),
                Token::CloseMustache,
                Token::Text("!".to_string()),
            ]
        );
    }

    #[test]
    fn test_self_closing_component() {
        assert_eq!(
            kinds("<@fields.name />"),
            vec![
                Token::OpenTag,
                Token::Path("@fields.name".to_string()),
                Token::SelfClose,
            ]
        );
    }

    #[test]
    fn test_block_with_params() {
        assert_eq!(
            kinds("{{#each-in @fields as |name Field|}}"),
            vec![
                Token::OpenBlock,
                Token::Path("each-in".to_string()),
                Token::Path("@fields".to_string()),
                Token::As,
                Token::Pipe,
                Token::Path("name".to_string()),
                Token::Path("Field".to_string()),
                Token::Pipe,
                Token::CloseMustache,
            ]
        );
    }

    #[test]
    fn test_tag_with_mustache_attribute() {
        assert_eq!(
            kinds(r#"<DateField @model={{@model.birthdate}} class="x > y" />"#),
            vec![
                Token::OpenTag,
                Token::Path("DateField".to_string()),
                Token::Path("@model".to_string()),
                Token::Equals,
                Token::OpenMustache,
                Token::Path("@model.birthdate".to_string()),
                Token::CloseMustache,
                Token::Path("class".to_string()),
                Token::Equals,
                Token::String("x > y".to_string()),
                Token::SelfClose,
            ]
        );
    }

    #[test]
    fn test_plain_angle_brackets_are_text() {
        assert_eq!(kinds("1 < 2"), vec![Token::Text("1 < 2".to_string())]);
    }

    #[test]
    fn test_comments_dropped() {
        assert_eq!(
            kinds("a{{!-- note }} --}}b{{! short }}c"),
            vec![
                Token::Text("a".to_string()),
                Token::Text("b".to_string()),
                Token::Text("c".to_string()),
            ]
        );
    }

    #[test]
    fn test_non_ascii_text() {
        assert_eq!(
            kinds("<p>Café – 🎉 {{@model.name}}</p>"),
            vec![
                Token::OpenTag,
                Token::Path("p".to_string()),
                Token::CloseTag,
                Token::Text("Café – 🎉 ".to_string()),
                Token::OpenMustache,
                Token::Path("@model.name".to_string()),
                Token::CloseMustache,
                Token::OpenEndTag,
                Token::Path("p".to_string()),
                Token::CloseTag,
            ]
        );
    }

    #[test]
    fn test_non_ascii_inside_islands() {
        assert_eq!(
            kinds(r#"<abbr title="naïve">{{t "déjà vu"}}</abbr>é"#),
            vec![
                Token::OpenTag,
                Token::Path("abbr".to_string()),
                Token::Path("title".to_string()),
                Token::Equals,
                Token::String("naïve".to_string()),
                Token::CloseTag,
                Token::OpenMustache,
                Token::Path("t".to_string()),
                Token::String("déjà vu".to_string()),
                Token::CloseMustache,
                Token::OpenEndTag,
                Token::Path("abbr".to_string()),
                Token::CloseTag,
                Token::Text("é".to_string()),
            ]
        );
    }

    #[test]
    fn test_unclosed_mustache_is_error() {
        let errors = lex("<div>{{@model.name</div>").unwrap_err();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].message(), "Unclosed mustache");
    }
}
