//! Template parser implementation using chumsky

use chumsky::input::{Stream, ValueInput};
use chumsky::prelude::*;

use crate::error::SyntaxError;
use crate::template::ast::*;
use crate::template::lexer::{self, format_token, Token};

/// Positional or named helper argument
#[derive(Debug, Clone)]
enum Arg {
    Param(Expr),
    Hash(String, Expr),
}

fn split_args(args: Vec<Arg>) -> (Vec<Expr>, Vec<(String, Expr)>) {
    let mut params = Vec::new();
    let mut hash = Vec::new();
    for arg in args {
        match arg {
            Arg::Param(e) => params.push(e),
            Arg::Hash(k, v) => hash.push((k, v)),
        }
    }
    (params, hash)
}

/// A quoted attribute value, split into text and interpolations when it
/// contains mustaches
fn quoted_value(value: String) -> Result<AttrValue, String> {
    if !value.contains("{{") {
        return Ok(AttrValue::Text(value));
    }
    let template = parse_template(&value).map_err(|errors| {
        errors
            .iter()
            .map(|e| e.message().to_string())
            .collect::<Vec<_>>()
            .join("; ")
    })?;
    template
        .nodes
        .into_iter()
        .map(|node| match node {
            Node::Text(text) => Ok(AttrPart::Text(text)),
            Node::Expression(expr) => Ok(AttrPart::Expr(expr)),
            _ => Err("a quoted attribute value may only hold text and mustaches".to_string()),
        })
        .collect::<Result<Vec<_>, _>>()
        .map(AttrValue::Concat)
}

/// Parse template source into a [`Template`]
pub fn parse_template(input: &str) -> Result<Template, Vec<SyntaxError>> {
    let len = input.len();
    let tokens = lexer::lex(input)?;
    let token_iter = tokens
        .into_iter()
        .map(|(tok, span)| (tok, SimpleSpan::from(span)));

    let token_stream =
        Stream::from_iter(token_iter).map((len..len).into(), |(t, s): (_, _)| (t, s));

    template_parser()
        .parse(token_stream)
        .into_result()
        .map_err(|errs| {
            errs.into_iter()
                .map(|e| SyntaxError::from_rich(e, format_token))
                .collect()
        })
}

fn template_parser<'a, I>() -> impl Parser<'a, I, Template, extra::Err<Rich<'a, Token>>> + Clone
where
    I: ValueInput<'a, Token = Token, Span = SimpleSpan>,
{
    let name = select! { Token::Path(p) => p };
    let path = name.clone().map(|p| PathExpr::parse(&p));

    let literal = select! {
        Token::String(s) => Literal::String(s),
        Token::Number(n) => Literal::Number(n),
        Token::True => Literal::Boolean(true),
        Token::False => Literal::Boolean(false),
    };

    // Expressions: paths, literals and parenthesized sub-expressions
    let expr = recursive(|expr| {
        let arg = choice((
            name.clone()
                .then_ignore(just(Token::Equals))
                .then(expr.clone())
                .map(|(k, v)| Arg::Hash(k, v)),
            expr.clone().map(Arg::Param),
        ));

        let sub_expression = path
            .clone()
            .then(arg.repeated().collect::<Vec<_>>())
            .delimited_by(just(Token::ParenOpen), just(Token::ParenClose))
            .map(|(callee, args)| {
                let (params, hash) = split_args(args);
                Expr::Call(Call {
                    callee,
                    params,
                    hash,
                })
            });

        choice((
            sub_expression,
            literal.clone().map(Expr::Literal),
            path.clone().map(Expr::Path),
        ))
    });

    let arg = choice((
        name.clone()
            .then_ignore(just(Token::Equals))
            .then(expr.clone())
            .map(|(k, v)| Arg::Hash(k, v)),
        expr.clone().map(Arg::Param),
    ));
    let args = arg.repeated().collect::<Vec<_>>();

    // Contents of `{{ ... }}`: a lone expression or a helper call
    let mustache_body = expr
        .clone()
        .then(args.clone())
        .try_map(|(head, args), span| {
            if args.is_empty() {
                return Ok(head);
            }
            match head {
                Expr::Path(callee) => {
                    let (params, hash) = split_args(args);
                    Ok(Expr::Call(Call {
                        callee,
                        params,
                        hash,
                    }))
                }
                _ => Err(Rich::custom(span, "only a path can be called with arguments")),
            }
        });

    let block_params = just(Token::As).ignore_then(
        select! { Token::Path(p) if !p.contains('.') => p }
            .repeated()
            .at_least(1)
            .collect::<Vec<_>>()
            .delimited_by(just(Token::Pipe), just(Token::Pipe)),
    );

    let open_block = just(Token::OpenBlock)
        .ignore_then(path.clone())
        .then(args.clone())
        .then(block_params.or_not())
        .then_ignore(just(Token::CloseMustache));

    let else_marker = just(Token::OpenMustache)
        .then(just(Token::Else))
        .then(just(Token::CloseMustache));

    let close_block = just(Token::OpenEndBlock)
        .ignore_then(path.clone())
        .then_ignore(just(Token::CloseMustache));

    let attr_value = choice((
        select! { Token::String(s) => s }
            .try_map(|value, span| quoted_value(value).map_err(|message| Rich::custom(span, message))),
        mustache_body
            .clone()
            .delimited_by(just(Token::OpenMustache), just(Token::CloseMustache))
            .map(AttrValue::Expr),
    ));

    let attribute = name
        .clone()
        .then(just(Token::Equals).ignore_then(attr_value).or_not())
        .map(|(name, value)| Attribute { name, value });

    let node = recursive(|node| {
        let nodes = node.repeated().collect::<Vec<_>>();

        let block = open_block
            .clone()
            .then(nodes.clone())
            .then(else_marker.ignore_then(nodes.clone()).or_not())
            .then(close_block)
            .try_map(|(((((helper, args), block_params), body), inverse), closing), span| {
                if closing != helper {
                    return Err(Rich::custom(
                        span,
                        format!(
                            "Mismatched closing block: expected {{{{/{}}}}}, found {{{{/{}}}}}",
                            helper, closing
                        ),
                    ));
                }
                let (params, hash) = split_args(args);
                Ok(Block {
                    helper,
                    params,
                    hash,
                    block_params: block_params.unwrap_or_default(),
                    body,
                    inverse,
                })
            });

        // `<br>`, `<img ...>`: no children and no closing tag
        let void_element = just(Token::OpenTag)
            .ignore_then(select! { Token::Path(p) if is_void_element(&p) => p })
            .then(attribute.clone().repeated().collect::<Vec<_>>())
            .then_ignore(just(Token::CloseTag))
            .map(|(tag, attributes)| Element {
                tag,
                attributes,
                children: Vec::new(),
                self_closing: false,
            });

        let element = just(Token::OpenTag)
            .ignore_then(name.clone())
            .then(attribute.clone().repeated().collect::<Vec<_>>())
            .then(choice((
                just(Token::SelfClose).to(None),
                just(Token::CloseTag)
                    .ignore_then(nodes.clone())
                    .then_ignore(just(Token::OpenEndTag))
                    .then(name.clone())
                    .then_ignore(just(Token::CloseTag))
                    .map(Some),
            )))
            .try_map(|((tag, attributes), rest), span| match rest {
                None => Ok(Element {
                    tag,
                    attributes,
                    children: Vec::new(),
                    self_closing: true,
                }),
                Some((children, closing)) if closing == tag => Ok(Element {
                    tag,
                    attributes,
                    children,
                    self_closing: false,
                }),
                Some((_, closing)) => Err(Rich::custom(
                    span,
                    format!("Mismatched closing tag: expected </{}>, found </{}>", tag, closing),
                )),
            });

        let mustache = mustache_body
            .clone()
            .delimited_by(just(Token::OpenMustache), just(Token::CloseMustache))
            .map(Node::Expression);

        let text = select! { Token::Text(t) => Node::Text(t) };

        choice((
            text,
            block.map(Node::Block),
            void_element.map(Node::Element),
            element.map(Node::Element),
            mustache,
        ))
        .boxed()
    });

    node.repeated()
        .collect()
        .then_ignore(end())
        .map(Template::new)
}
