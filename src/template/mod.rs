//! Card template language
//!
//! Templates are parsed into a small generic node model (text, expression,
//! element invocation, block) that the transformer rewrites and the printer
//! lowers back to source.
//!
//! # Example
//!
//! ```text
//! <article>
//!   <h1>{{@model.title}}</h1>
//!   <@fields.author />
//!   {{#each @model.tags as |Tag|}}<Tag />{{/each}}
//! </article>
//! ```

pub mod ast;
mod grammar;
pub mod lexer;
mod printer;

pub use ast::*;
pub use grammar::parse_template;
