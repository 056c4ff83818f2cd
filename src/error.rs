//! Error types for document declaration and schema generation.

use std::fmt;

use thiserror::Error;

/// A single step of the processing context in which an error occurred.
///
/// Steps accumulate as a generation error propagates out of a nested
/// graph, so the failing node can be located in a deep document tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// A document compiled under a role.
    Document { document: String, role: String },
    /// A named property slot.
    Field { name: String },
    /// A keyword-valued slot (`items`, `additionalProperties`, `not`, ...).
    Attribute { name: &'static str },
    /// A position in a tuple of fields or a combinator alternative list.
    Item { index: usize },
}

impl Step {
    pub fn document(document: impl Into<String>, role: impl Into<String>) -> Self {
        Step::Document {
            document: document.into(),
            role: role.into(),
        }
    }

    pub fn field(name: impl Into<String>) -> Self {
        Step::Field { name: name.into() }
    }

    pub fn attribute(name: &'static str) -> Self {
        Step::Attribute { name }
    }

    pub fn item(index: usize) -> Self {
        Step::Item { index }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Step::Document { document, role } => {
                write!(f, "document {} for role \"{}\"", document, role)
            }
            Step::Field { name } => write!(f, "field \"{}\"", name),
            Step::Attribute { name } => write!(f, "attribute \"{}\"", name),
            Step::Item { index } => write!(f, "item {}", index),
        }
    }
}

/// The processing context of a [`GenerationError`], outermost step first
/// when displayed.
///
/// Internally steps are stored innermost-first, since each nesting level
/// appends its own step while the error propagates outwards.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Trail(Vec<Step>);

impl Trail {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Steps ordered outermost first.
    pub fn steps(&self) -> impl Iterator<Item = &Step> {
        self.0.iter().rev()
    }

    pub(crate) fn push(&mut self, step: Step) {
        self.0.push(step);
    }
}

impl fmt::Display for Trail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return Ok(());
        }
        write!(f, " (")?;
        for (i, step) in self.steps().enumerate() {
            if i > 0 {
                write!(f, " -> ")?;
            }
            write!(f, "{}", step)?;
        }
        write!(f, ")")
    }
}

/// Error produced while compiling a schema, carrying the processing
/// context needed to locate the offending node.
#[derive(Debug, Clone, Error, PartialEq)]
#[error("schema generation failed{trail}: {kind}")]
pub struct GenerationError {
    pub trail: Trail,
    pub kind: GenerationErrorKind,
}

impl GenerationError {
    /// Wrap the error with one more (outer) processing step.
    pub(crate) fn within(mut self, step: Step) -> Self {
        self.trail.push(step);
        self
    }
}

impl From<GenerationErrorKind> for GenerationError {
    fn from(kind: GenerationErrorKind) -> Self {
        GenerationError {
            trail: Trail::default(),
            kind,
        }
    }
}

/// The failure kinds surfaced during schema generation.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum GenerationErrorKind {
    #[error("definition id \"{definition_id}\" is claimed by both \"{first}\" and \"{second}\"")]
    DefinitionCollision {
        definition_id: String,
        first: String,
        second: String,
    },

    #[error("the negated schema resolved to absent for role \"{role}\"")]
    AbsentNotOperand { role: String },

    #[error("every \"{keyword}\" alternative resolved to absent for role \"{role}\"")]
    EmptyCombinator {
        keyword: &'static str,
        role: String,
    },

    #[error("a tuple of fields resolved where a single schema is expected for role \"{role}\"")]
    UnexpectedTuple { role: String },

    #[error("document reference target \"{document}\" is no longer alive")]
    DanglingReference { document: String },

    #[error("a self reference is used outside of a document")]
    UnboundSelfReference,
}

/// Malformed declarations rejected when a document is built, so that
/// compile-time traversal can assume a well-formed graph.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DeclarationError {
    #[error("document \"{document}\" declares field \"{name}\" more than once")]
    DuplicateField { document: String, name: String },
}
