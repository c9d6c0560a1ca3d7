//! Generic template node model
//!
//! Any mustache/element style grammar can be lowered onto these four node
//! kinds: text, expression, element invocation and block.

/// A parsed template: a sequence of top-level nodes
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Template {
    pub nodes: Vec<Node>,
}

impl Template {
    pub fn new(nodes: Vec<Node>) -> Self {
        Self { nodes }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    /// Literal markup or text, kept verbatim
    Text(String),
    /// A value interpolation, `{{expr}}`
    Expression(Expr),
    /// An element or component invocation, `<tag ...>...</tag>`
    Element(Element),
    /// A block helper with a body, `{{#helper ...}}...{{/helper}}`
    Block(Block),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Path(PathExpr),
    Literal(Literal),
    /// Helper invocation with positional and named arguments
    Call(Call),
}

impl Expr {
    pub fn path(s: &str) -> Self {
        Expr::Path(PathExpr::parse(s))
    }

    pub fn string(s: impl Into<String>) -> Self {
        Expr::Literal(Literal::String(s.into()))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    String(String),
    Number(f64),
    Boolean(bool),
}

/// A dotted reference such as `@model.address.city` or `Item`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PathExpr {
    pub head: String,
    pub tail: Vec<String>,
}

impl PathExpr {
    pub fn new(head: impl Into<String>, tail: Vec<String>) -> Self {
        Self {
            head: head.into(),
            tail,
        }
    }

    pub fn parse(s: &str) -> Self {
        let mut parts = s.split('.').map(|p| p.to_string());
        let head = parts.next().unwrap_or_default();
        Self {
            head,
            tail: parts.collect(),
        }
    }

    /// A copy of this path with one more trailing segment
    pub fn child(&self, segment: &str) -> Self {
        let mut tail = self.tail.clone();
        tail.push(segment.to_string());
        Self {
            head: self.head.clone(),
            tail,
        }
    }

    pub fn is_bare(&self) -> bool {
        self.tail.is_empty()
    }
}

impl std::fmt::Display for PathExpr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.head)?;
        for segment in &self.tail {
            write!(f, ".{}", segment)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    pub callee: PathExpr,
    pub params: Vec<Expr>,
    pub hash: Vec<(String, Expr)>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Element {
    pub tag: String,
    pub attributes: Vec<Attribute>,
    pub children: Vec<Node>,
    pub self_closing: bool,
}

impl Element {
    /// A self-closing invocation with no children
    pub fn invocation(tag: impl Into<String>, attributes: Vec<Attribute>) -> Self {
        Self {
            tag: tag.into(),
            attributes,
            children: Vec::new(),
            self_closing: true,
        }
    }
}

/// HTML elements that never have content or a closing tag
const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source", "track",
    "wbr",
];

/// Whether `<tag>` is written without a closing tag
pub fn is_void_element(tag: &str) -> bool {
    VOID_ELEMENTS.contains(&tag)
}

#[derive(Debug, Clone, PartialEq)]
pub struct Attribute {
    pub name: String,
    pub value: Option<AttrValue>,
}

impl Attribute {
    pub fn expr(name: impl Into<String>, expr: Expr) -> Self {
        Self {
            name: name.into(),
            value: Some(AttrValue::Expr(expr)),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum AttrValue {
    Text(String),
    Expr(Expr),
    /// A quoted value with interpolations, `class="card {{@model.kind}}"`
    Concat(Vec<AttrPart>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum AttrPart {
    Text(String),
    Expr(Expr),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub helper: PathExpr,
    pub params: Vec<Expr>,
    pub hash: Vec<(String, Expr)>,
    /// Names bound by `as |a b|`
    pub block_params: Vec<String>,
    pub body: Vec<Node>,
    /// Nodes after `{{else}}`
    pub inverse: Option<Vec<Node>>,
}

impl Block {
    /// `{{#each <collection> as |<var>|}}<body>{{/each}}`
    pub fn each(collection: Expr, var: impl Into<String>, body: Vec<Node>) -> Self {
        Self {
            helper: PathExpr::parse("each"),
            params: vec![collection],
            hash: Vec::new(),
            block_params: vec![var.into()],
            body,
            inverse: None,
        }
    }
}
