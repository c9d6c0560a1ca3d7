//! One compile call: dependency resolution, flattening and format modules

use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use indexmap::IndexMap;
use tracing::{debug, trace};

use crate::card::{Cardinality, CompiledCard, CompiledField, FormatMeta, RawCard};
use crate::config::CompilerConfig;
use crate::format::Format;
use crate::schema::{parse_schema, resolve_card_url};
use crate::template::{parse_template, Expr, Node, Template};
use crate::transform::{transform, TransformContext};

use super::builder::{Builder, BuilderError};
use super::error::CompileError;
use super::modules::{Importer, ModuleEmitter};

type BoxFuture<'s, T> = Pin<Box<dyn Future<Output = T> + Send + 's>>;

/// Local module name of a card's schema
const SCHEMA_MODULE: &str = "schema.js";

/// How a card on the in-progress stack was reached
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Edge {
    Root,
    Adoption,
    Field,
}

/// A template read from a card's files
struct LoadedTemplate {
    path: String,
    template: Template,
}

/// Call-scoped compile state
///
/// Every url is fetched and compiled at most once per session, so cards
/// reached along several paths share one `Arc`.
pub(crate) struct Session<'c> {
    builder: &'c dyn Builder,
    emitter: &'c dyn ModuleEmitter,
    config: &'c CompilerConfig,
    memo: HashMap<String, Arc<CompiledCard>>,
    in_progress: Vec<(String, Edge)>,
}

impl<'c> Session<'c> {
    pub(crate) fn new(
        builder: &'c dyn Builder,
        emitter: &'c dyn ModuleEmitter,
        config: &'c CompilerConfig,
    ) -> Self {
        Self {
            builder,
            emitter,
            config,
            memo: HashMap::new(),
            in_progress: Vec::new(),
        }
    }

    /// Compile a raw card reached through `edge`
    pub(crate) async fn compile_raw(
        &mut self,
        raw: &RawCard,
        edge: Edge,
    ) -> Result<Arc<CompiledCard>, CompileError> {
        let url = raw.url();
        self.in_progress.push((url.clone(), edge));
        let result = self.compile_card(raw, &url).await;
        self.in_progress.pop();

        let card = Arc::new(result?);
        self.memo.insert(url, card.clone());
        Ok(card)
    }

    /// Resolve a referenced card: memo, then the builder's compiled cache,
    /// then fetch and compile
    fn resolve<'s>(
        &'s mut self,
        url: String,
        referenced_by: &'s str,
        edge: Edge,
    ) -> BoxFuture<'s, Result<Arc<CompiledCard>, CompileError>> {
        Box::pin(async move {
            if let Some(card) = self.memo.get(&url) {
                trace!(card = %url, "memo hit");
                return Ok(card.clone());
            }
            self.check_cycle(&url, edge)?;

            let load_error = |source: BuilderError| match source {
                BuilderError::NotFound { .. } => CompileError::unknown_card(&url, referenced_by),
                source => CompileError::Builder {
                    url: url.clone(),
                    source,
                },
            };

            if let Some(card) = self
                .builder
                .get_compiled_card(&url)
                .await
                .map_err(load_error)?
            {
                trace!(card = %url, "served from compiled cache");
                self.memo.insert(url, card.clone());
                return Ok(card);
            }

            let raw = self.builder.get_raw_card(&url).await.map_err(load_error)?;
            self.compile_raw(&raw, edge).await
        })
    }

    /// Fail if `url` is already being compiled further up the stack
    fn check_cycle(&self, url: &str, edge: Edge) -> Result<(), CompileError> {
        let Some(start) = self.in_progress.iter().position(|(u, _)| u == url) else {
            return Ok(());
        };

        let mut chain: Vec<String> = self.in_progress[start..]
            .iter()
            .map(|(u, _)| u.clone())
            .collect();
        chain.push(url.to_string());

        let adoption_only = edge == Edge::Adoption
            && self.in_progress[start + 1..]
                .iter()
                .all(|(_, e)| *e == Edge::Adoption);
        if adoption_only {
            Err(CompileError::CyclicAdoption { chain })
        } else {
            Err(CompileError::CyclicFieldReference { chain })
        }
    }

    async fn compile_card(&mut self, raw: &RawCard, url: &str) -> Result<CompiledCard, CompileError> {
        debug!(card = %url, "compiling card");

        let parent = match &raw.adopts_from {
            Some(reference) => {
                let parent_url = resolve_card_url(url, reference);
                Some(self.resolve(parent_url, url, Edge::Adoption).await?)
            }
            None => None,
        };

        let schema_source = match &raw.schema {
            Some(path) => Some(
                raw.file(path)
                    .ok_or_else(|| CompileError::missing_file(url, path))?,
            ),
            None => None,
        };
        let schema = match schema_source {
            Some(source) => parse_schema(source, url).map_err(|source| CompileError::Schema {
                card: url.to_string(),
                source,
            })?,
            None => Default::default(),
        };

        let mut fields: IndexMap<String, CompiledField> = parent
            .as_ref()
            .map(|p| p.fields.clone())
            .unwrap_or_default();
        for decl in schema.fields {
            if let Some(inherited) = fields.get(&decl.name) {
                if inherited.cardinality != decl.cardinality {
                    return Err(CompileError::InvalidFieldOverride {
                        card: url.to_string(),
                        field: decl.name,
                        inherited: inherited.cardinality,
                        declared: decl.cardinality,
                    });
                }
            }
            let card = self.resolve(decl.target_card_url, url, Edge::Field).await?;
            // An override keeps the inherited position
            fields.insert(
                decl.name.clone(),
                CompiledField {
                    name: decl.name,
                    cardinality: decl.cardinality,
                    computed: decl.computed,
                    card,
                },
            );
        }

        if let Some(data) = &raw.data {
            if let Some(field) = data.keys().find(|key| !fields.contains_key(*key)) {
                return Err(CompileError::UnknownField {
                    card: url.to_string(),
                    field: field.clone(),
                });
            }
        }

        let mut card = CompiledCard::new(url);
        card.serializer = schema
            .serializer
            .or_else(|| parent.as_ref().and_then(|p| p.serializer.clone()));
        card.schema_module = match schema_source {
            Some(source) => Some(self.emitter.define(url, SCHEMA_MODULE, source)),
            None => parent.as_ref().and_then(|p| p.schema_module.clone()),
        };
        card.inlinable = match load_template(raw, url, Format::Embedded)? {
            Some(embedded) => is_value_template(&embedded.template),
            None => parent.as_ref().is_some_and(|p| p.inlinable),
        };

        for &format in &self.config.formats {
            let meta = match load_template(raw, url, format)? {
                Some(loaded) => Some(self.compile_format(url, format, loaded, &fields)?),
                None => parent.as_ref().and_then(|p| p.format(format).cloned()),
            };
            *card.format_mut(format) = meta;
        }

        card.fields = fields;
        card.adopts_from = parent;
        Ok(card)
    }

    fn compile_format(
        &self,
        url: &str,
        format: Format,
        loaded: LoadedTemplate,
        fields: &IndexMap<String, CompiledField>,
    ) -> Result<FormatMeta, CompileError> {
        debug!(card = %url, %format, path = %loaded.path, "compiling format");

        let mut used_fields = Vec::new();
        let mut importer = Importer::new(self.config.component_suffix.as_str());
        let transformed = {
            let mut choose = |card: &CompiledCard| importer.name_for(card);
            transform(
                &loaded.template,
                TransformContext {
                    fields,
                    used_fields: &mut used_fields,
                    import_and_choose_name: &mut choose,
                },
            )
            .map_err(|source| CompileError::Transform {
                card: url.to_string(),
                format,
                source,
            })?
        };

        if let Some(component) = importer.missing_component() {
            return Err(CompileError::MissingComponent {
                card: url.to_string(),
                component: component.to_string(),
            });
        }

        let source = importer.render_module(&transformed.to_string());
        let module_name = self
            .emitter
            .define(url, &self.config.format_module(format), &source);
        let serializer_map = serializer_map(&used_fields, fields);

        Ok(FormatMeta {
            module_name,
            used_fields,
            serializer_map,
        })
    }
}

fn load_template(
    raw: &RawCard,
    url: &str,
    format: Format,
) -> Result<Option<LoadedTemplate>, CompileError> {
    let Some(path) = raw.template_path(format) else {
        return Ok(None);
    };
    let source = raw
        .file(path)
        .ok_or_else(|| CompileError::missing_file(url, path))?;
    let template = parse_template(source).map_err(|errors| CompileError::Template {
        card: url.to_string(),
        format,
        path: path.to_string(),
        template: source.to_string(),
        errors,
    })?;
    Ok(Some(LoadedTemplate {
        path: path.to_string(),
        template,
    }))
}

/// A template consisting of exactly `{{@model}}`, ignoring surrounding whitespace
fn is_value_template(template: &Template) -> bool {
    let mut significant = template
        .nodes
        .iter()
        .filter(|node| !matches!(node, Node::Text(t) if t.trim().is_empty()));
    match (significant.next(), significant.next()) {
        (Some(Node::Expression(Expr::Path(path))), None) => path.head == "@model" && path.is_bare(),
        _ => false,
    }
}

/// Group used fields (and the nested used fields of compound fields) by
/// the serializer their card declares
fn serializer_map(
    used_fields: &[String],
    fields: &IndexMap<String, CompiledField>,
) -> BTreeMap<String, Vec<String>> {
    let mut map: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for name in used_fields {
        let Some(field) = fields.get(name) else {
            continue;
        };
        if let Some(serializer) = &field.card.serializer {
            map.entry(serializer.clone()).or_default().push(name.clone());
        }
        if field.cardinality == Cardinality::Contains && !field.card.inlinable {
            if let Some(embedded) = &field.card.embedded {
                for (serializer, paths) in &embedded.serializer_map {
                    let entry = map.entry(serializer.clone()).or_default();
                    entry.extend(paths.iter().map(|p| format!("{}.{}", name, p)));
                }
            }
        }
    }
    map
}
