//! Lowering of the template AST back to source text

use std::fmt::{self, Display, Formatter};

use crate::template::ast::*;

impl Display for Template {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write_nodes(f, &self.nodes)
    }
}

fn write_nodes(f: &mut Formatter<'_>, nodes: &[Node]) -> fmt::Result {
    for node in nodes {
        write!(f, "{}", node)?;
    }
    Ok(())
}

impl Display for Node {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Node::Text(text) => f.write_str(text),
            Node::Expression(expr) => write!(f, "{}", Mustache(expr)),
            Node::Element(element) => write!(f, "{}", element),
            Node::Block(block) => write!(f, "{}", block),
        }
    }
}

/// `{{expr}}`
struct Mustache<'a>(&'a Expr);

impl Display for Mustache<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str("{{")?;
        write_call_body(f, self.0)?;
        f.write_str("}}")
    }
}

/// Top-level calls inside `{{ }}` are written without parentheses
fn write_call_body(f: &mut Formatter<'_>, expr: &Expr) -> fmt::Result {
    match expr {
        Expr::Call(call) => write_call(f, call),
        other => write!(f, "{}", other),
    }
}

fn write_call(f: &mut Formatter<'_>, call: &Call) -> fmt::Result {
    write!(f, "{}", call.callee)?;
    write_args(f, &call.params, &call.hash)
}

fn write_args(f: &mut Formatter<'_>, params: &[Expr], hash: &[(String, Expr)]) -> fmt::Result {
    for param in params {
        write!(f, " {}", param)?;
    }
    for (key, value) in hash {
        write!(f, " {}={}", key, value)?;
    }
    Ok(())
}

impl Display for Expr {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Path(path) => write!(f, "{}", path),
            Expr::Literal(literal) => write!(f, "{}", literal),
            Expr::Call(call) => {
                f.write_str("(")?;
                write_call(f, call)?;
                f.write_str(")")
            }
        }
    }
}

impl Display for Literal {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Literal::String(s) => write!(f, "\"{}\"", escape(s)),
            Literal::Number(n) => write!(f, "{}", n),
            Literal::Boolean(b) => write!(f, "{}", b),
        }
    }
}

fn escape(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}

impl Display for Element {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "<{}", self.tag)?;
        for attribute in &self.attributes {
            write!(f, " {}", attribute)?;
        }
        if self.self_closing && self.children.is_empty() {
            return f.write_str(" />");
        }
        f.write_str(">")?;
        if is_void_element(&self.tag) && self.children.is_empty() {
            return Ok(());
        }
        write_nodes(f, &self.children)?;
        write!(f, "</{}>", self.tag)
    }
}

impl Display for Attribute {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)?;
        match &self.value {
            None => Ok(()),
            Some(AttrValue::Text(text)) => write!(f, "=\"{}\"", escape(text)),
            Some(AttrValue::Expr(expr)) => {
                f.write_str("={{")?;
                write_call_body(f, expr)?;
                f.write_str("}}")
            }
            Some(AttrValue::Concat(parts)) => {
                f.write_str("=\"")?;
                for part in parts {
                    match part {
                        AttrPart::Text(text) => f.write_str(&escape(text))?,
                        // Inside quotes a string literal is written as plain text
                        AttrPart::Expr(Expr::Literal(Literal::String(s))) => {
                            f.write_str(&escape(s))?
                        }
                        AttrPart::Expr(expr) => {
                            f.write_str(&escape(&Mustache(expr).to_string()))?
                        }
                    }
                }
                f.write_str("\"")
            }
        }
    }
}

impl Display for Block {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{{{{#{}", self.helper)?;
        write_args(f, &self.params, &self.hash)?;
        if !self.block_params.is_empty() {
            write!(f, " as |{}|", self.block_params.join(" "))?;
        }
        f.write_str("}}")?;
        write_nodes(f, &self.body)?;
        if let Some(inverse) = &self.inverse {
            f.write_str("{{else}}")?;
            write_nodes(f, inverse)?;
        }
        write!(f, "{{{{/{}}}}}", self.helper)
    }
}
