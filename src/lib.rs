//! Card Compiler - compiles declarative content-model cards
//!
//! A raw card declares typed fields, an optional parent and one template per
//! display format. Compiling it resolves the parent and field target cards,
//! flattens the field graph and rewrites each template so that field
//! invocations become plain values, wrapped components or loops. Raw and
//! compiled cards travel between processes as a deduplicated JSON document.
//!
//! # Example
//!
//! ```rust
//! use card_compiler::compile_bundle;
//!
//! #[tokio::main]
//! async fn main() {
//!     let bundle = r#"[
//!         {"realm": "https://cards.test/", "id": "string",
//!          "embedded": "embedded.hbs", "files": {"embedded.hbs": "{{@model}}"}},
//!         {"realm": "https://cards.test/", "id": "person",
//!          "schema": "schema.card", "embedded": "embedded.hbs",
//!          "files": {"schema.card": "contains name: \"./string\"",
//!                    "embedded.hbs": "<h1><@fields.name /></h1>"}}
//!     ]"#;
//!
//!     let document = compile_bundle(bundle, "https://cards.test/person").await.unwrap();
//!     assert_eq!(document.data.id, "https://cards.test/person");
//!     assert!(!document.included.is_empty());
//! }
//! ```

pub mod card;
pub mod compiler;
pub mod config;
pub mod error;
pub mod format;
pub mod schema;
pub mod serializer;
pub mod template;
pub mod transform;

pub use card::{Cardinality, CompiledCard, CompiledField, FieldDecl, FormatMeta, RawCard};
pub use compiler::{
    Builder, BuilderError, CompileError, Compiler, MemoryBuilder, ModuleCache, ModuleEmitter,
};
pub use config::{CompilerConfig, ConfigError};
pub use error::SyntaxError;
pub use format::{Format, UnknownFormat};
pub use schema::{parse_schema, Schema, SchemaError};
pub use serializer::{deserialize, from_json, serialize, to_json, Document, SerializeError};
pub use template::{parse_template, Template};
pub use transform::{transform, transform_source, TransformContext, TransformError};

use thiserror::Error;

/// Errors that can occur in the bundle pipeline
#[derive(Debug, Error)]
pub enum CardError {
    /// The bundle is not a JSON array of raw cards
    #[error("invalid card bundle: {0}")]
    Bundle(#[source] serde_json::Error),

    #[error("compile error: {0}")]
    Compile(#[from] CompileError),

    #[error("serialization error: {0}")]
    Serialize(#[from] SerializeError),

    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Format(#[from] UnknownFormat),
}

/// Compile the card at `url` from a JSON bundle of raw cards and serialize
/// it with its compiled form
pub async fn compile_bundle(bundle: &str, url: &str) -> Result<Document, CardError> {
    compile_bundle_with_config(bundle, url, CompilerConfig::default()).await
}

/// Like [`compile_bundle`], with a custom configuration
pub async fn compile_bundle_with_config(
    bundle: &str,
    url: &str,
    config: CompilerConfig,
) -> Result<Document, CardError> {
    let builder = MemoryBuilder::from_json(bundle).map_err(CardError::Bundle)?;
    let modules = ModuleCache::new();
    let compiler = Compiler::new(&builder, &modules).with_config(config);

    let compiled = compiler.compile_url(url).await?;
    let raw = builder
        .raw_card(url)
        .ok_or_else(|| CompileError::unknown_card(url, url))?;
    Ok(serialize(raw, Some(&compiled)))
}
