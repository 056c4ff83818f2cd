//! Role-aware JSON Schema generation from declarative document graphs.
//!
//! A document is declared as an ordered graph of typed field nodes; any
//! slot in that graph may be role-conditional, so one declaration compiles
//! into different JSON Schema draft-04 documents per audience. Recursive
//! and shared documents are extracted into the `definitions` section and
//! redirected through `$ref` pointers instead of being inlined forever.
//!
//! # Example
//!
//! ```
//! use role_schema::{Document, StringField, Var, DEFAULT_ROLE};
//! use serde_json::json;
//!
//! let user = Document::builder("User")
//!     .no_schema_uri()
//!     .field("login", StringField::new().required(true))
//!     .field("password_hash", Var::new().case("internal", StringField::new()))
//!     .build()
//!     .unwrap();
//!
//! let internal = user.get_schema("internal", true).unwrap();
//! assert!(internal["properties"].get("password_hash").is_some());
//!
//! // For every other role the conditional slot resolves to absent.
//! let public = user.get_schema(DEFAULT_ROLE, true).unwrap();
//! assert_eq!(
//!     public,
//!     json!({
//!         "type": "object",
//!         "properties": { "login": { "type": "string" } },
//!         "additionalProperties": false,
//!         "required": ["login"]
//!     })
//! );
//! ```
//!
//! # Recursion
//!
//! A document whose fields can reach a reference back to itself under the
//! active role compiles into a named definition plus a `$ref`, so cyclic
//! graphs always terminate:
//!
//! ```
//! use role_schema::{Document, DocumentField, StringField, DEFAULT_ROLE};
//!
//! let node = Document::builder("Node")
//!     .field("value", StringField::new())
//!     .field("next", DocumentField::self_reference())
//!     .build()
//!     .unwrap();
//!
//! assert!(node.is_recursive(DEFAULT_ROLE));
//! let schema = node.get_schema(DEFAULT_ROLE, true).unwrap();
//! assert_eq!(schema["$ref"], "#/definitions/main.Node");
//! assert!(schema["definitions"]["main.Node"]["properties"].get("next").is_some());
//! ```

mod compiler;
mod document;
mod error;
mod fields;
pub mod registry;
mod roles;
mod scope;

pub use compiler::Definitions;
pub use document::{Document, DocumentBuilder, DocumentOptions, SCHEMA_DRAFT_04};
pub use error::{DeclarationError, GenerationError, GenerationErrorKind, Step, Trail};
pub use fields::{
    Additional, ArrayField, Attributes, BooleanField, Combinator, CombinatorField, DictField,
    DocumentField, Field, IntField, Items, NotField, NullField, NumberField, StringField, Target,
    Walk,
};
pub use roles::{FieldSlot, Matcher, Payload, Resolved, Var, DEFAULT_ROLE};
pub use scope::ResolutionScope;
