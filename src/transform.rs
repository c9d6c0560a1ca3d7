//! Template rewriting against a card's resolved fields
//!
//! Field-shaped element invocations are expanded according to the target
//! card's shape and the field's cardinality:
//!
//! - an inlinable `contains` field becomes `{{@model.field}}`
//! - a compound `contains` field becomes `<Imported @model={{@model.field}} />`
//! - a `containsMany` field becomes an `{{#each}}` over the collection whose
//!   body is one of the two forms above applied to the loop variable
//!
//! Author-written loops over collection fields bind their loop variable so
//! that `<Item />` anywhere in the body is rewritten the same way, and
//! `{{#each-in @fields as |name Field|}}` is unrolled once per field.

use std::collections::HashMap;
use std::sync::Arc;

use indexmap::IndexMap;
use thiserror::Error;
use tracing::trace;

use crate::card::{Cardinality, CompiledCard, CompiledField};
use crate::error::SyntaxError;
use crate::template::{
    parse_template, AttrPart, AttrValue, Attribute, Block, Call, Element, Expr, Node, PathExpr,
    Template,
};

/// Errors raised while rewriting a template
#[derive(Debug, Error, Clone, PartialEq)]
pub enum TransformError {
    #[error("unknown field '{path}'")]
    UnknownField { path: String },

    #[error("cannot resolve '{name}' to a field or loop variable")]
    UnresolvedLoopVariable { name: String },

    #[error("malformed field invocation <{tag}>: {reason}")]
    MalformedFieldInvocation { tag: String, reason: String },

    #[error("template syntax error: {}", format_errors(.0))]
    Syntax(Vec<SyntaxError>),
}

fn format_errors(errors: &[SyntaxError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

impl TransformError {
    fn malformed(tag: &str, reason: &str) -> Self {
        TransformError::MalformedFieldInvocation {
            tag: tag.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// Inputs and outputs of a single transform call
pub struct TransformContext<'a> {
    /// Flattened fields of the card that owns the template
    pub fields: &'a IndexMap<String, CompiledField>,
    /// Receives every referenced field name once, in first-use order
    pub used_fields: &'a mut Vec<String>,
    /// Imports the display component of a compound card, returning its local name
    pub import_and_choose_name: &'a mut dyn FnMut(&CompiledCard) -> String,
}

/// Rewrite a parsed template
pub fn transform(template: &Template, ctx: TransformContext<'_>) -> Result<Template, TransformError> {
    let mut transformer = Transformer {
        root: ctx.fields,
        used_fields: ctx.used_fields,
        importer: ctx.import_and_choose_name,
        imported: HashMap::new(),
        scopes: Vec::new(),
    };
    let nodes = transformer.transform_nodes(&template.nodes)?;
    Ok(Template::new(nodes))
}

/// Parse, rewrite and print a template source
pub fn transform_source(source: &str, ctx: TransformContext<'_>) -> Result<String, TransformError> {
    let template = parse_template(source).map_err(TransformError::Syntax)?;
    Ok(transform(&template, ctx)?.to_string())
}

/// What a name bound in a template scope stands for
#[derive(Debug, Clone)]
enum Binding {
    /// One item of a collection field, addressed by `model`
    Item { card: Arc<CompiledCard>, model: PathExpr },
    /// The component placeholder of an unrolled each-in
    Field {
        field: CompiledField,
        model: PathExpr,
        used: Option<String>,
    },
    /// The name placeholder of an unrolled each-in
    Name(String),
    /// A block param unrelated to fields
    Opaque,
}

/// Which root field an unrolled each-in records when a placeholder is used
#[derive(Debug, Clone)]
enum FieldUse {
    /// Iterating the root fields: each field records itself
    PerField,
    /// Iterating the fields of a root compound field
    Parent(String),
    /// Iterating the fields of a loop item
    Nothing,
}

/// The fields an each-in iterates and where their values live
struct EachInTarget {
    fields: Vec<CompiledField>,
    model: PathExpr,
    used: FieldUse,
}

/// A field reference resolved to its card and model expression
#[derive(Debug, Clone)]
struct Resolved {
    card: Arc<CompiledCard>,
    cardinality: Cardinality,
    model: PathExpr,
}

struct Transformer<'a> {
    root: &'a IndexMap<String, CompiledField>,
    used_fields: &'a mut Vec<String>,
    importer: &'a mut dyn FnMut(&CompiledCard) -> String,
    /// Card url -> local component name, for this template only
    imported: HashMap<String, String>,
    scopes: Vec<HashMap<String, Binding>>,
}

fn is_fields_root(head: &str) -> bool {
    head == "@fields" || head == "Fields"
}

/// `StartDate` -> `startDate`
fn camel_case(tag: &str) -> Option<String> {
    let mut chars = tag.chars();
    let first = chars.next()?;
    if !first.is_ascii_uppercase() || tag.contains('.') {
        return None;
    }
    Some(first.to_ascii_lowercase().to_string() + chars.as_str())
}

/// Walk `segments` through nested field maps starting at `fields`
fn walk(
    fields: &IndexMap<String, CompiledField>,
    model: PathExpr,
    segments: &[String],
    tag: &str,
    missing: impl Fn(String) -> TransformError,
) -> Result<Option<Resolved>, TransformError> {
    let mut fields = fields;
    let mut model = model;
    for (i, segment) in segments.iter().enumerate() {
        let field = fields
            .get(segment)
            .ok_or_else(|| missing(segments[..=i].join(".")))?;
        model = model.child(segment);
        if i + 1 == segments.len() {
            return Ok(Some(Resolved {
                card: field.card.clone(),
                cardinality: field.cardinality,
                model,
            }));
        }
        if field.is_many() {
            return Err(TransformError::malformed(
                tag,
                &format!("cannot reach into items of collection field '{}'", segment),
            ));
        }
        fields = &field.card.fields;
    }
    Ok(None)
}

impl<'a> Transformer<'a> {
    fn lookup(&self, name: &str) -> Option<&Binding> {
        self.scopes.iter().rev().find_map(|scope| scope.get(name))
    }

    fn use_field(&mut self, name: &str) {
        if !self.used_fields.iter().any(|f| f == name) {
            trace!(field = name, "field used");
            self.used_fields.push(name.to_string());
        }
    }

    fn import(&mut self, card: &CompiledCard) -> String {
        if let Some(local) = self.imported.get(&card.url) {
            return local.clone();
        }
        let local = (self.importer)(card);
        self.imported.insert(card.url.clone(), local.clone());
        local
    }

    /// A loop variable name for `field` not bound in any enclosing scope
    fn fresh_var(&self, field: &str) -> String {
        let base = format!("{}Item", field);
        let mut candidate = base.clone();
        let mut n = 0;
        while self.lookup(&candidate).is_some() {
            n += 1;
            candidate = format!("{}{}", base, n);
        }
        candidate
    }

    /// Resolve the target of an element tag, if the tag names a field
    fn resolve_invocation(&mut self, tag: &str) -> Result<Option<Resolved>, TransformError> {
        let path = PathExpr::parse(tag);

        if let Some(binding) = self.lookup(&path.head).cloned() {
            return self.resolve_binding(binding, &path, tag);
        }

        let segments: Vec<String> = if is_fields_root(&path.head) {
            if path.is_bare() {
                return Err(TransformError::malformed(tag, "missing field name"));
            }
            path.tail.clone()
        } else {
            match camel_case(&path.head) {
                Some(name) if self.root.contains_key(&name) => vec![name],
                _ => return Ok(None),
            }
        };

        let resolved = walk(self.root, PathExpr::parse("@model"), &segments, tag, |path| {
            TransformError::UnknownField { path }
        })?;
        self.use_field(&segments[0]);
        Ok(resolved)
    }

    fn resolve_binding(
        &mut self,
        binding: Binding,
        path: &PathExpr,
        tag: &str,
    ) -> Result<Option<Resolved>, TransformError> {
        let unresolved = |name: String| TransformError::UnresolvedLoopVariable { name };
        match binding {
            Binding::Opaque => Ok(None),
            Binding::Name(_) => Err(unresolved(tag.to_string())),
            Binding::Item { card, model } => {
                if path.is_bare() {
                    return Ok(Some(Resolved {
                        card,
                        cardinality: Cardinality::Contains,
                        model,
                    }));
                }
                walk(&card.fields, model, &path.tail, tag, |_| unresolved(tag.to_string()))
            }
            Binding::Field { field, model, used } => {
                if let Some(used) = &used {
                    self.use_field(used);
                }
                if path.is_bare() {
                    return Ok(Some(Resolved {
                        card: field.card,
                        cardinality: field.cardinality,
                        model,
                    }));
                }
                if field.is_many() {
                    return Err(TransformError::malformed(
                        tag,
                        &format!("cannot reach into items of collection field '{}'", field.name),
                    ));
                }
                walk(&field.card.fields, model, &path.tail, tag, |_| {
                    unresolved(tag.to_string())
                })
            }
        }
    }

    fn transform_nodes(&mut self, nodes: &[Node]) -> Result<Vec<Node>, TransformError> {
        let mut out = Vec::with_capacity(nodes.len());
        for node in nodes {
            match node {
                Node::Text(text) => out.push(Node::Text(text.clone())),
                Node::Expression(expr) => out.push(Node::Expression(self.transform_expr(expr)?)),
                Node::Element(element) => out.extend(self.transform_element(element)?),
                Node::Block(block) => out.extend(self.transform_block(block)?),
            }
        }
        Ok(out)
    }

    /// Data positions: values stay values, placeholders are substituted
    fn transform_expr(&mut self, expr: &Expr) -> Result<Expr, TransformError> {
        match expr {
            Expr::Literal(_) => Ok(expr.clone()),
            Expr::Call(call) => Ok(Expr::Call(Call {
                callee: call.callee.clone(),
                params: call
                    .params
                    .iter()
                    .map(|p| self.transform_expr(p))
                    .collect::<Result<_, _>>()?,
                hash: call
                    .hash
                    .iter()
                    .map(|(k, v)| Ok((k.clone(), self.transform_expr(v)?)))
                    .collect::<Result<_, TransformError>>()?,
            })),
            Expr::Path(path) => self.transform_path(path),
        }
    }

    fn transform_path(&mut self, path: &PathExpr) -> Result<Expr, TransformError> {
        match self.lookup(&path.head).cloned() {
            Some(Binding::Name(name)) => {
                if path.is_bare() {
                    Ok(Expr::string(name))
                } else {
                    Err(TransformError::UnresolvedLoopVariable {
                        name: path.to_string(),
                    })
                }
            }
            Some(Binding::Field { model, used, .. }) => {
                if let Some(used) = &used {
                    self.use_field(used);
                }
                let mut model = model;
                for segment in &path.tail {
                    model = model.child(segment);
                }
                Ok(Expr::Path(model))
            }
            Some(_) => Ok(Expr::Path(path.clone())),
            None if path.head == "@model" => {
                if let Some(first) = path.tail.first() {
                    if self.root.contains_key(first) {
                        self.use_field(first);
                    }
                }
                Ok(Expr::Path(path.clone()))
            }
            None if is_fields_root(&path.head) => {
                let first = path.tail.first().ok_or_else(|| TransformError::UnknownField {
                    path: path.to_string(),
                })?;
                if !self.root.contains_key(first) {
                    return Err(TransformError::UnknownField {
                        path: path.tail.join("."),
                    });
                }
                self.use_field(first);
                Ok(Expr::Path(PathExpr::new("@model", path.tail.clone())))
            }
            None => Ok(Expr::Path(path.clone())),
        }
    }

    fn transform_attributes(
        &mut self,
        attributes: &[Attribute],
    ) -> Result<Vec<Attribute>, TransformError> {
        attributes
            .iter()
            .map(|attr| {
                let value = match &attr.value {
                    Some(AttrValue::Expr(expr)) => Some(AttrValue::Expr(self.transform_expr(expr)?)),
                    Some(AttrValue::Concat(parts)) => Some(AttrValue::Concat(
                        parts
                            .iter()
                            .map(|part| match part {
                                AttrPart::Expr(expr) => Ok(AttrPart::Expr(self.transform_expr(expr)?)),
                                text => Ok(text.clone()),
                            })
                            .collect::<Result<_, TransformError>>()?,
                    )),
                    other => other.clone(),
                };
                Ok(Attribute {
                    name: attr.name.clone(),
                    value,
                })
            })
            .collect()
    }

    fn transform_element(&mut self, element: &Element) -> Result<Vec<Node>, TransformError> {
        if let Some(resolved) = self.resolve_invocation(&element.tag)? {
            if !element.children.is_empty() {
                return Err(TransformError::malformed(
                    &element.tag,
                    "field invocations cannot have a body",
                ));
            }
            let attributes = self.transform_attributes(&element.attributes)?;
            return Ok(self.render_field(resolved, attributes));
        }

        Ok(vec![Node::Element(Element {
            tag: element.tag.clone(),
            attributes: self.transform_attributes(&element.attributes)?,
            children: self.transform_nodes(&element.children)?,
            self_closing: element.self_closing,
        })])
    }

    /// Full render of a field: single item, or a synthesized loop for collections
    fn render_field(&mut self, resolved: Resolved, attributes: Vec<Attribute>) -> Vec<Node> {
        match resolved.cardinality {
            Cardinality::Contains => {
                vec![self.render_item(&resolved.card, Expr::Path(resolved.model), attributes)]
            }
            Cardinality::ContainsMany => {
                let field = resolved.model.tail.last().unwrap_or(&resolved.model.head);
                let var = self.fresh_var(field);
                let body =
                    self.render_item(&resolved.card, Expr::Path(PathExpr::parse(&var)), attributes);
                vec![Node::Block(Block::each(
                    Expr::Path(resolved.model),
                    var,
                    vec![body],
                ))]
            }
        }
    }

    fn render_item(&mut self, card: &CompiledCard, model: Expr, attributes: Vec<Attribute>) -> Node {
        if card.inlinable {
            return Node::Expression(model);
        }
        let local = self.import(card);
        let mut attrs = vec![Attribute::expr("@model", model)];
        attrs.extend(attributes);
        Node::Element(Element::invocation(local, attrs))
    }

    fn transform_block(&mut self, block: &Block) -> Result<Vec<Node>, TransformError> {
        match block.helper.to_string().as_str() {
            "each-in" => {
                if let Some(Expr::Path(target)) = block.params.first() {
                    if let Some(target) = self.each_in_target(target)? {
                        return self.unroll_each_in(block, target);
                    }
                }
            }
            "each" => {
                if let Some(collection) = block.params.first() {
                    if let Some(resolved) = self.find_collection(collection)? {
                        return self.transform_field_loop(block, resolved);
                    }
                }
            }
            _ => {}
        }
        self.transform_generic_block(block)
    }

    fn transform_generic_block(&mut self, block: &Block) -> Result<Vec<Node>, TransformError> {
        let params = block
            .params
            .iter()
            .map(|p| self.transform_expr(p))
            .collect::<Result<Vec<_>, _>>()?;
        let hash = block
            .hash
            .iter()
            .map(|(k, v)| Ok((k.clone(), self.transform_expr(v)?)))
            .collect::<Result<Vec<_>, TransformError>>()?;

        self.scopes.push(
            block
                .block_params
                .iter()
                .map(|p| (p.clone(), Binding::Opaque))
                .collect(),
        );
        let body = self.transform_nodes(&block.body);
        self.scopes.pop();
        let body = body?;

        let inverse = match &block.inverse {
            Some(nodes) => Some(self.transform_nodes(nodes)?),
            None => None,
        };

        Ok(vec![Node::Block(Block {
            helper: block.helper.clone(),
            params,
            hash,
            block_params: block.block_params.clone(),
            body,
            inverse,
        })])
    }

    /// Find a collection field referenced by a loop's collection expression,
    /// looking through helper calls wrapped around it
    fn find_collection(&self, expr: &Expr) -> Result<Option<Resolved>, TransformError> {
        match expr {
            Expr::Literal(_) => Ok(None),
            Expr::Call(call) => {
                for param in call.params.iter().chain(call.hash.iter().map(|(_, v)| v)) {
                    if let Some(found) = self.find_collection(param)? {
                        return Ok(Some(found));
                    }
                }
                Ok(None)
            }
            Expr::Path(path) => {
                let resolved = match self.lookup(&path.head) {
                    Some(Binding::Item { card, model }) => {
                        walk(&card.fields, model.clone(), &path.tail, &path.to_string(), |name| {
                            TransformError::UnresolvedLoopVariable { name }
                        })?
                    }
                    Some(Binding::Field { field, model, .. }) => {
                        if path.is_bare() {
                            Some(Resolved {
                                card: field.card.clone(),
                                cardinality: field.cardinality,
                                model: model.clone(),
                            })
                        } else if field.is_many() {
                            None
                        } else {
                            walk(&field.card.fields, model.clone(), &path.tail, &path.to_string(), |name| {
                                TransformError::UnresolvedLoopVariable { name }
                            })?
                        }
                    }
                    Some(_) => None,
                    None if path.head == "@model" || is_fields_root(&path.head) => {
                        match path.tail.first() {
                            Some(first) if self.root.contains_key(first) => walk(
                                self.root,
                                PathExpr::parse("@model"),
                                &path.tail,
                                &path.to_string(),
                                |path| TransformError::UnknownField { path },
                            )?,
                            _ => None,
                        }
                    }
                    None => None,
                };
                Ok(resolved.filter(|r| r.cardinality == Cardinality::ContainsMany))
            }
        }
    }

    fn transform_field_loop(
        &mut self,
        block: &Block,
        resolved: Resolved,
    ) -> Result<Vec<Node>, TransformError> {
        let params = block
            .params
            .iter()
            .map(|p| self.transform_expr(p))
            .collect::<Result<Vec<_>, _>>()?;
        let hash = block
            .hash
            .iter()
            .map(|(k, v)| Ok((k.clone(), self.transform_expr(v)?)))
            .collect::<Result<Vec<_>, TransformError>>()?;

        let mut scope = HashMap::new();
        for (i, param) in block.block_params.iter().enumerate() {
            let binding = if i == 0 {
                Binding::Item {
                    card: resolved.card.clone(),
                    model: PathExpr::parse(param),
                }
            } else {
                Binding::Opaque
            };
            scope.insert(param.clone(), binding);
        }
        trace!(collection = %resolved.model, "rewriting field loop");

        self.scopes.push(scope);
        let body = self.transform_nodes(&block.body);
        self.scopes.pop();
        let body = body?;

        let inverse = match &block.inverse {
            Some(nodes) => Some(self.transform_nodes(nodes)?),
            None => None,
        };

        Ok(vec![Node::Block(Block {
            helper: block.helper.clone(),
            params,
            hash,
            block_params: block.block_params.clone(),
            body,
            inverse,
        })])
    }

    /// Fields iterated by an each-in, or `None` for a runtime each-in over data
    fn each_in_target(&mut self, target: &PathExpr) -> Result<Option<EachInTarget>, TransformError> {
        let tag = target.to_string();
        if let Some(binding) = self.lookup(&target.head).cloned() {
            let (card, model) = match binding {
                Binding::Item { card, model } => (card, model),
                Binding::Field { field, model, .. } if !field.is_many() => (field.card, model),
                Binding::Opaque => return Ok(None),
                _ => return Err(TransformError::UnresolvedLoopVariable { name: tag }),
            };
            let (card, model) = if target.is_bare() {
                (card, model)
            } else {
                match walk(&card.fields, model, &target.tail, &tag, |name| {
                    TransformError::UnresolvedLoopVariable { name }
                })? {
                    Some(r) if r.cardinality == Cardinality::Contains => (r.card, r.model),
                    _ => return Err(TransformError::UnresolvedLoopVariable { name: tag }),
                }
            };
            return Ok(Some(EachInTarget {
                fields: card.fields.values().cloned().collect(),
                model,
                used: FieldUse::Nothing,
            }));
        }

        if !is_fields_root(&target.head) {
            return Ok(None);
        }
        if target.is_bare() {
            return Ok(Some(EachInTarget {
                fields: self.root.values().cloned().collect(),
                model: PathExpr::parse("@model"),
                used: FieldUse::PerField,
            }));
        }
        match walk(self.root, PathExpr::parse("@model"), &target.tail, &tag, |path| {
            TransformError::UnknownField { path }
        })? {
            Some(r) if r.cardinality == Cardinality::Contains => Ok(Some(EachInTarget {
                fields: r.card.fields.values().cloned().collect(),
                model: r.model,
                used: FieldUse::Parent(target.tail[0].clone()),
            })),
            _ => Err(TransformError::malformed(
                &tag,
                "each-in can only iterate the fields of a single card",
            )),
        }
    }

    fn unroll_each_in(
        &mut self,
        block: &Block,
        target: EachInTarget,
    ) -> Result<Vec<Node>, TransformError> {
        let EachInTarget { fields, model, used } = target;
        let [name_param, field_param] = block.block_params.as_slice() else {
            return Err(TransformError::malformed(
                "each-in",
                "iterating fields requires `as |name Field|`",
            ));
        };
        trace!(fields = fields.len(), "unrolling each-in");

        if fields.is_empty() {
            return match &block.inverse {
                Some(nodes) => self.transform_nodes(nodes),
                None => Ok(Vec::new()),
            };
        }

        let mut out = Vec::new();
        for field in &fields {
            let used = match &used {
                FieldUse::PerField => Some(field.name.clone()),
                FieldUse::Parent(name) => Some(name.clone()),
                FieldUse::Nothing => None,
            };
            let mut scope = HashMap::new();
            scope.insert(name_param.clone(), Binding::Name(field.name.clone()));
            scope.insert(
                field_param.clone(),
                Binding::Field {
                    field: field.clone(),
                    model: model.child(&field.name),
                    used,
                },
            );
            self.scopes.push(scope);
            let body = self.transform_nodes(&block.body);
            self.scopes.pop();
            out.extend(body?);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::card::Cardinality::{Contains, ContainsMany};
    use pretty_assertions::assert_eq;

    fn primitive(url: &str) -> Arc<CompiledCard> {
        let mut card = CompiledCard::new(url);
        card.inlinable = true;
        Arc::new(card)
    }

    fn compound(url: &str, fields: Vec<(&str, Cardinality, Arc<CompiledCard>)>) -> Arc<CompiledCard> {
        let mut card = CompiledCard::new(url);
        card.fields = field_map(fields);
        Arc::new(card)
    }

    fn field_map(fields: Vec<(&str, Cardinality, Arc<CompiledCard>)>) -> IndexMap<String, CompiledField> {
        fields
            .into_iter()
            .map(|(name, cardinality, card)| {
                (
                    name.to_string(),
                    CompiledField {
                        name: name.to_string(),
                        cardinality,
                        computed: false,
                        card,
                    },
                )
            })
            .collect()
    }

    fn string_card() -> Arc<CompiledCard> {
        primitive("https://cardstack.com/base/string")
    }

    fn date_card() -> Arc<CompiledCard> {
        compound("https://cardstack.com/base/date", vec![])
    }

    /// Local names derived from the last url segment: `.../date` -> `DateField`
    fn name_for(card: &CompiledCard) -> String {
        let last = card.url.rsplit('/').next().unwrap_or_default();
        let mut chars = last.chars();
        let head = chars.next().map(|c| c.to_ascii_uppercase()).unwrap_or_default();
        format!("{}{}Field", head, chars.as_str())
    }

    fn run(
        source: &str,
        fields: &IndexMap<String, CompiledField>,
    ) -> Result<(String, Vec<String>), TransformError> {
        let mut used = Vec::new();
        let mut importer = |card: &CompiledCard| name_for(card);
        let out = transform_source(
            source,
            TransformContext {
                fields,
                used_fields: &mut used,
                import_and_choose_name: &mut importer,
            },
        )?;
        Ok((out, used))
    }

    fn person_fields() -> IndexMap<String, CompiledField> {
        field_map(vec![
            ("name", Contains, string_card()),
            ("birthdate", Contains, date_card()),
        ])
    }

    #[test]
    fn test_person_embedded_template() {
        let (out, used) = run("<Fields.name/><Fields.birthdate/>", &person_fields()).unwrap();
        assert_eq!(out, "{{@model.name}}<DateField @model={{@model.birthdate}} />");
        assert_eq!(used, vec!["name", "birthdate"]);
    }

    #[test]
    fn test_inlinable_field_becomes_value_expression() {
        let (out, used) = run("<Name />", &person_fields()).unwrap();
        assert_eq!(out, "{{@model.name}}");
        assert_eq!(used, vec!["name"]);
    }

    #[test]
    fn test_compound_field_wraps_with_stable_name() {
        let mut calls = 0;
        let mut used = Vec::new();
        let fields = person_fields();
        let mut importer = |card: &CompiledCard| {
            calls += 1;
            name_for(card)
        };
        let out = transform_source(
            "<Birthdate /><p><@fields.birthdate /></p>",
            TransformContext {
                fields: &fields,
                used_fields: &mut used,
                import_and_choose_name: &mut importer,
            },
        )
        .unwrap();
        assert_eq!(
            out,
            "<DateField @model={{@model.birthdate}} /><p><DateField @model={{@model.birthdate}} /></p>"
        );
        assert_eq!(calls, 1);
        assert_eq!(used, vec!["birthdate"]);
    }

    #[test]
    fn test_data_expression_left_unchanged() {
        let (out, used) = run("<time>{{@model.birthdate}}</time>", &person_fields()).unwrap();
        assert_eq!(out, "<time>{{@model.birthdate}}</time>");
        assert_eq!(used, vec!["birthdate"]);
    }

    #[test]
    fn test_contains_many_without_loop_synthesizes_each() {
        let fields = field_map(vec![
            ("tags", ContainsMany, string_card()),
            ("dates", ContainsMany, date_card()),
        ]);
        let (out, used) = run("<@fields.tags /><@fields.dates />", &fields).unwrap();
        assert_eq!(
            out,
            "{{#each @model.tags as |tagsItem|}}{{tagsItem}}{{/each}}\
             {{#each @model.dates as |datesItem|}}<DateField @model={{datesItem}} />{{/each}}"
        );
        assert_eq!(used, vec!["tags", "dates"]);
    }

    #[test]
    fn test_author_loop_rewrites_nested_item_only() {
        let fields = field_map(vec![("dates", ContainsMany, date_card())]);
        let (out, used) = run(
            r#"{{#each @model.dates as |D|}}<div class="row">{{#if D}}<span>{{D}}</span><D />{{/if}}</div>{{/each}}"#,
            &fields,
        )
        .unwrap();
        assert_eq!(
            out,
            r#"{{#each @model.dates as |D|}}<div class="row">{{#if D}}<span>{{D}}</span><DateField @model={{D}} />{{/if}}</div>{{/each}}"#
        );
        assert_eq!(used, vec!["dates"]);
    }

    #[test]
    fn test_author_loop_over_helper_wrapped_collection() {
        let person = compound(
            "https://cards.test/person",
            vec![("name", Contains, string_card())],
        );
        let fields = field_map(vec![("people", ContainsMany, person)]);
        let (out, used) = run(
            r#"{{#each (sort-by "name" @fields.people) as |P|}}<P /> / <P.name />{{/each}}"#,
            &fields,
        )
        .unwrap();
        assert_eq!(
            out,
            r#"{{#each (sort-by "name" @model.people) as |P|}}<PersonField @model={{P}} /> / {{P.name}}{{/each}}"#
        );
        assert_eq!(used, vec!["people"]);
    }

    #[test]
    fn test_each_in_unrolls_every_field_in_order() {
        let event = compound("https://cards.test/event", vec![]);
        let fields = field_map(vec![
            ("title", Contains, string_card()),
            ("startDate", Contains, date_card()),
            ("items", ContainsMany, string_card()),
            ("events", ContainsMany, event),
        ]);
        let (out, used) = run(
            "{{#each-in @fields as |name Field|}}<label>{{name}}</label><Field />{{/each-in}}",
            &fields,
        )
        .unwrap();
        assert_eq!(
            out,
            concat!(
                r#"<label>{{"title"}}</label>{{@model.title}}"#,
                r#"<label>{{"startDate"}}</label><DateField @model={{@model.startDate}} />"#,
                r#"<label>{{"items"}}</label>{{#each @model.items as |itemsItem|}}{{itemsItem}}{{/each}}"#,
                r#"<label>{{"events"}}</label>{{#each @model.events as |eventsItem|}}<EventField @model={{eventsItem}} />{{/each}}"#,
            )
        );
        assert!(!out.contains("each-in"));
        assert_eq!(used, vec!["title", "startDate", "items", "events"]);
    }

    #[test]
    fn test_each_in_data_use_of_placeholder() {
        let (out, _) = run(
            "{{#each-in @fields as |name Field|}}<dd title={{name}}>{{Field}}</dd>{{/each-in}}",
            &person_fields(),
        )
        .unwrap();
        assert_eq!(
            out,
            r#"<dd title={{"name"}}>{{@model.name}}</dd><dd title={{"birthdate"}}>{{@model.birthdate}}</dd>"#
        );
    }

    #[test]
    fn test_unknown_field_invocation() {
        let err = run("<@fields.nickname />", &person_fields()).unwrap_err();
        assert_eq!(
            err,
            TransformError::UnknownField {
                path: "nickname".to_string()
            }
        );
    }

    #[test]
    fn test_field_invocation_without_field_name() {
        let err = run("<@fields />", &person_fields()).unwrap_err();
        assert!(matches!(err, TransformError::MalformedFieldInvocation { .. }));
    }

    #[test]
    fn test_field_invocation_with_body_is_malformed() {
        let err = run("<@fields.name>hi</@fields.name>", &person_fields()).unwrap_err();
        assert!(matches!(err, TransformError::MalformedFieldInvocation { .. }));
    }

    #[test]
    fn test_unresolved_loop_variable_path() {
        let person = compound(
            "https://cards.test/person",
            vec![("name", Contains, string_card())],
        );
        let fields = field_map(vec![("people", ContainsMany, person)]);
        let err = run(
            "{{#each @model.people as |P|}}<P.nickname />{{/each}}",
            &fields,
        )
        .unwrap_err();
        assert_eq!(
            err,
            TransformError::UnresolvedLoopVariable {
                name: "P.nickname".to_string()
            }
        );
    }

    #[test]
    fn test_name_placeholder_as_component_is_unresolved() {
        let err = run(
            "{{#each-in @fields as |name Field|}}<name />{{/each-in}}",
            &person_fields(),
        )
        .unwrap_err();
        assert!(matches!(err, TransformError::UnresolvedLoopVariable { .. }));
    }

    #[test]
    fn test_each_in_requires_two_block_params() {
        let err = run(
            "{{#each-in @fields as |Field|}}<Field />{{/each-in}}",
            &person_fields(),
        )
        .unwrap_err();
        assert!(matches!(err, TransformError::MalformedFieldInvocation { .. }));
    }

    #[test]
    fn test_synthesized_loop_avoids_shadowing() {
        let fields = field_map(vec![("tags", ContainsMany, string_card())]);
        let (out, _) = run(
            "{{#each @model.other as |tagsItem|}}<@fields.tags />{{/each}}",
            &fields,
        )
        .unwrap();
        assert_eq!(
            out,
            "{{#each @model.other as |tagsItem|}}{{#each @model.tags as |tagsItem1|}}{{tagsItem1}}{{/each}}{{/each}}"
        );
    }

    #[test]
    fn test_nested_contains_path() {
        let address = compound(
            "https://cards.test/address",
            vec![("city", Contains, string_card())],
        );
        let fields = field_map(vec![("address", Contains, address)]);
        let (out, used) = run("<@fields.address.city />", &fields).unwrap();
        assert_eq!(out, "{{@model.address.city}}");
        assert_eq!(used, vec!["address"]);
    }

    #[test]
    fn test_quoted_attribute_interpolations_are_transformed() {
        let (out, used) = run(
            r#"<div class="x {{@model.name}}" title="born {{@fields.birthdate}}"></div>"#,
            &person_fields(),
        )
        .unwrap();
        assert_eq!(
            out,
            r#"<div class="x {{@model.name}}" title="born {{@model.birthdate}}"></div>"#
        );
        assert_eq!(used, vec!["name", "birthdate"]);
    }

    #[test]
    fn test_each_in_name_inside_quoted_attribute() {
        let (out, _) = run(
            r#"{{#each-in @fields as |name Field|}}<dd class="f-{{name}}">{{Field}}</dd>{{/each-in}}"#,
            &person_fields(),
        )
        .unwrap();
        assert_eq!(
            out,
            r#"<dd class="f-name">{{@model.name}}</dd><dd class="f-birthdate">{{@model.birthdate}}</dd>"#
        );
    }

    #[test]
    fn test_void_elements_pass_through() {
        let (out, used) = run("<p><Name /><br><input value={{@model.name}}></p>", &person_fields())
            .unwrap();
        assert_eq!(out, "<p>{{@model.name}}<br><input value={{@model.name}}></p>");
        assert_eq!(used, vec!["name"]);
    }

    #[test]
    fn test_each_in_over_nested_contains_field() {
        let address = compound(
            "https://cards.test/address",
            vec![("city", Contains, string_card()), ("moved", Contains, date_card())],
        );
        let fields = field_map(vec![
            ("name", Contains, string_card()),
            ("address", Contains, address),
        ]);
        let (out, used) = run(
            "{{#each-in @fields.address as |n F|}}{{n}}<F />{{/each-in}}",
            &fields,
        )
        .unwrap();
        assert_eq!(
            out,
            r#"{{"city"}}{{@model.address.city}}{{"moved"}}<DateField @model={{@model.address.moved}} />"#
        );
        assert_eq!(used, vec!["address"]);
    }

    #[test]
    fn test_each_in_over_loop_item() {
        let person = compound(
            "https://cards.test/person",
            vec![
                ("name", Contains, string_card()),
                ("birthdate", Contains, date_card()),
            ],
        );
        let fields = field_map(vec![("people", ContainsMany, person)]);
        let (out, used) = run(
            "{{#each @model.people as |P|}}{{#each-in P as |n F|}}<F />{{/each-in}}{{/each}}",
            &fields,
        )
        .unwrap();
        assert_eq!(
            out,
            "{{#each @model.people as |P|}}{{P.name}}<DateField @model={{P.birthdate}} />{{/each}}"
        );
        assert_eq!(used, vec!["people"]);
    }

    #[test]
    fn test_each_in_over_many_field_is_malformed() {
        let fields = field_map(vec![("tags", ContainsMany, string_card())]);
        let err = run("{{#each-in @fields.tags as |n F|}}<F />{{/each-in}}", &fields).unwrap_err();
        assert!(matches!(err, TransformError::MalformedFieldInvocation { .. }));
    }

    #[test]
    fn test_transform_is_deterministic() {
        let source = "{{#each-in @fields as |name Field|}}<Field />{{/each-in}}";
        let first = run(source, &person_fields()).unwrap();
        let second = run(source, &person_fields()).unwrap();
        assert_eq!(first, second);
    }
}
