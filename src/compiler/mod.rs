//! Card compiler
//!
//! Resolves a raw card's parent and field targets through a [`Builder`],
//! flattens the field graph, compiles every configured format's template
//! and hands the generated modules to a [`ModuleEmitter`].

pub mod builder;
pub mod error;
pub mod modules;
mod session;

pub use builder::{Builder, BuilderError, MemoryBuilder};
pub use error::CompileError;
pub use modules::{module_specifier, Importer, ModuleCache, ModuleEmitter};

use std::sync::Arc;

use tracing::debug;

use crate::card::{CompiledCard, RawCard};
use crate::config::CompilerConfig;

use session::{Edge, Session};

/// Compiles raw cards into [`CompiledCard`]s
///
/// The compiler keeps no state between calls; each [`Compiler::compile`]
/// resolves its dependencies in a fresh session.
pub struct Compiler<'a> {
    builder: &'a dyn Builder,
    emitter: &'a dyn ModuleEmitter,
    config: CompilerConfig,
}

impl<'a> Compiler<'a> {
    pub fn new(builder: &'a dyn Builder, emitter: &'a dyn ModuleEmitter) -> Self {
        Self {
            builder,
            emitter,
            config: CompilerConfig::default(),
        }
    }

    /// Set the compiler configuration
    pub fn with_config(mut self, config: CompilerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &CompilerConfig {
        &self.config
    }

    /// Compile `raw` and everything it depends on
    pub async fn compile(&self, raw: &RawCard) -> Result<Arc<CompiledCard>, CompileError> {
        debug!(card = %raw.url(), formats = ?self.config.formats, "compile session started");
        let mut session = Session::new(self.builder, self.emitter, &self.config);
        session.compile_raw(raw, Edge::Root).await
    }

    /// Fetch the card at `url` from the builder and compile it
    pub async fn compile_url(&self, url: &str) -> Result<Arc<CompiledCard>, CompileError> {
        let raw = self.builder.get_raw_card(url).await.map_err(|source| match source {
            BuilderError::NotFound { .. } => CompileError::unknown_card(url, url),
            source => CompileError::Builder {
                url: url.to_string(),
                source,
            },
        })?;
        self.compile(&raw).await
    }
}
