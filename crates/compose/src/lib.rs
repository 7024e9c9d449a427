//! Report composition: template definition + input data → [`DocumentTree`].
//!
//! Templates are JSON documents describing typed input fields, derived totals,
//! named text styles and an ordered body of elements. [`Composer::compose`]
//! binds and type-checks the data, renders `{{placeholder}}` text through
//! Handlebars in strict mode, and returns a validated tree. Composition is
//! pure apart from the template lookup.
//!
//! [`DocumentTree`]: quire_model::DocumentTree

mod bind;
mod composer;
pub mod error;
pub mod source;
pub mod template;

pub use bind::{BoundData, FieldValue};
pub use composer::Composer;
pub use error::{ComposeError, TemplateError};
pub use source::{DirectoryTemplateSource, InMemoryTemplateSource, TemplateSource};
pub use template::TemplateDef;
