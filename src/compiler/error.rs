//! Error types for the card compiler

use thiserror::Error;

use crate::card::Cardinality;
use crate::error::SyntaxError;
use crate::format::Format;
use crate::schema::SchemaError;
use crate::transform::TransformError;

use super::builder::BuilderError;

/// Errors that abort a compile
#[derive(Debug, Error)]
pub enum CompileError {
    /// A parent or field target the builder does not know
    #[error("card '{url}' referenced by '{referenced_by}' does not exist")]
    UnknownCardReference { url: String, referenced_by: String },

    /// The builder failed for a reason other than a missing card
    #[error("could not load card '{url}': {source}")]
    Builder {
        url: String,
        #[source]
        source: BuilderError,
    },

    /// A card adopts from itself through its parent chain
    #[error("cyclic adoption: {}", chain.join(" -> "))]
    CyclicAdoption { chain: Vec<String> },

    /// Field targets (possibly mixed with adoption) lead back to a card being compiled
    #[error("cyclic field reference: {}", chain.join(" -> "))]
    CyclicFieldReference { chain: Vec<String> },

    /// An inherited field redeclared with a different cardinality
    #[error("card '{card}' changes field '{field}' from {inherited} to {declared}")]
    InvalidFieldOverride {
        card: String,
        field: String,
        inherited: Cardinality,
        declared: Cardinality,
    },

    /// Card data names a field the card does not have
    #[error("card '{card}' has data for unknown field '{field}'")]
    UnknownField { card: String, field: String },

    /// A schema or template path missing from the card's files
    #[error("card '{card}' references missing file '{path}'")]
    MissingFile { card: String, path: String },

    /// A template renders a compound card that has no embedded format
    #[error("card '{card}' renders '{component}', which has no embedded template")]
    MissingComponent { card: String, component: String },

    #[error("invalid schema in card '{card}': {source}")]
    Schema {
        card: String,
        #[source]
        source: SchemaError,
    },

    /// Template syntax errors, kept with their source for reporting
    #[error("syntax error in {format} template '{path}' of card '{card}'")]
    Template {
        card: String,
        format: Format,
        path: String,
        template: String,
        errors: Vec<SyntaxError>,
    },

    #[error("cannot compile {format} template of card '{card}': {source}")]
    Transform {
        card: String,
        format: Format,
        #[source]
        source: TransformError,
    },
}

impl CompileError {
    /// Create an unknown card reference error
    pub fn unknown_card(url: impl Into<String>, referenced_by: impl Into<String>) -> Self {
        Self::UnknownCardReference {
            url: url.into(),
            referenced_by: referenced_by.into(),
        }
    }

    /// Create a missing file error
    pub fn missing_file(card: impl Into<String>, path: impl Into<String>) -> Self {
        Self::MissingFile {
            card: card.into(),
            path: path.into(),
        }
    }

    /// The chain of urls forming a cycle, if this is a cycle error
    pub fn cycle(&self) -> Option<&[String]> {
        match self {
            Self::CyclicAdoption { chain } | Self::CyclicFieldReference { chain } => Some(chain),
            _ => None,
        }
    }

    /// Render template syntax errors as annotated source reports
    pub fn report(&self) -> Option<String> {
        match self {
            Self::Template {
                path,
                template,
                errors,
                ..
            } => Some(
                errors
                    .iter()
                    .map(|e| e.format(template, path))
                    .collect::<Vec<_>>()
                    .join("\n"),
            ),
            _ => None,
        }
    }
}
