//! Role matchers and role-conditional slots.
//!
//! A [`Var`] decorates a slot position inside a composite field: instead of
//! holding one field, the slot holds an ordered list of `(matcher, payload)`
//! cases and resolves to exactly one payload per role. Resolution is
//! first-match-wins over declaration order, so authors list specific roles
//! before catch-all matchers.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::fields::Field;

/// The conventional role used when no particular audience is requested.
pub const DEFAULT_ROLE: &str = "default";

/// The role-predicate language for [`Var`] cases and field propagation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Matcher {
    /// Matches every role.
    All,
    /// Matches any of the listed roles exactly.
    Roles(Vec<String>),
    /// Matches any role except the listed ones.
    Not(Vec<String>),
}

impl Matcher {
    /// A matcher for one exact role.
    pub fn role(role: impl Into<String>) -> Self {
        Matcher::Roles(vec![role.into()])
    }

    /// A matcher for any of the given roles.
    pub fn any_of<I, S>(roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Matcher::Roles(roles.into_iter().map(Into::into).collect())
    }

    /// A matcher for every role except the given ones.
    pub fn not_roles<I, S>(roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Matcher::Not(roles.into_iter().map(Into::into).collect())
    }

    pub fn matches(&self, role: &str) -> bool {
        match self {
            Matcher::All => true,
            Matcher::Roles(roles) => roles.iter().any(|r| r == role),
            Matcher::Not(roles) => !roles.iter().any(|r| r == role),
        }
    }
}

impl From<&str> for Matcher {
    fn from(role: &str) -> Self {
        Matcher::role(role)
    }
}

impl From<String> for Matcher {
    fn from(role: String) -> Self {
        Matcher::role(role)
    }
}

/// What a [`Var`] case carries.
#[derive(Debug, Clone)]
pub enum Payload {
    /// The slot is not declared for the matched roles.
    Absent,
    /// A single field.
    Single(Arc<Field>),
    /// A fixed sequence of fields (positional array items).
    Tuple(Vec<Arc<Field>>),
    /// A nested var, resolved recursively against the same role.
    Nested(Box<Var>),
}

impl Payload {
    /// A tuple payload from any sequence of fields.
    pub fn tuple<I, F>(fields: I) -> Self
    where
        I: IntoIterator<Item = F>,
        F: Into<Arc<Field>>,
    {
        Payload::Tuple(fields.into_iter().map(Into::into).collect())
    }
}

impl From<Field> for Payload {
    fn from(field: Field) -> Self {
        Payload::Single(Arc::new(field))
    }
}

impl From<Arc<Field>> for Payload {
    fn from(field: Arc<Field>) -> Self {
        Payload::Single(field)
    }
}

impl From<Var> for Payload {
    fn from(var: Var) -> Self {
        Payload::Nested(Box::new(var))
    }
}

/// The fully-resolved view of a slot for one role.
///
/// Consumers treat [`Resolved::Absent`] as "never declared": the slot's
/// keyword is omitted from the generated schema, never emitted as `null`.
#[derive(Debug, Clone)]
pub enum Resolved {
    Absent,
    Single(Arc<Field>),
    Tuple(Vec<Arc<Field>>),
}

impl Resolved {
    pub fn is_absent(&self) -> bool {
        matches!(self, Resolved::Absent)
    }

    /// The resolved fields, in order; empty for an absent slot.
    pub fn fields(&self) -> Vec<Arc<Field>> {
        match self {
            Resolved::Absent => Vec::new(),
            Resolved::Single(field) => vec![field.clone()],
            Resolved::Tuple(fields) => fields.clone(),
        }
    }
}

/// A role-conditional slot decorator: an ordered list of
/// `(matcher, payload)` cases.
#[derive(Debug, Clone, Default)]
pub struct Var {
    cases: Vec<(Matcher, Payload)>,
}

impl Var {
    pub fn new() -> Self {
        Var::default()
    }

    /// Append a case. Earlier cases win.
    pub fn case(mut self, matcher: impl Into<Matcher>, payload: impl Into<Payload>) -> Self {
        self.cases.push((matcher.into(), payload.into()));
        self
    }

    /// Append a case that resolves to absent.
    pub fn absent_case(mut self, matcher: impl Into<Matcher>) -> Self {
        self.cases.push((matcher.into(), Payload::Absent));
        self
    }

    pub fn cases(&self) -> &[(Matcher, Payload)] {
        &self.cases
    }

    /// Resolve against a role: the first matching case wins, nested vars
    /// are resolved recursively, and no match means absent.
    pub fn resolve(&self, role: &str) -> Resolved {
        for (matcher, payload) in &self.cases {
            if matcher.matches(role) {
                return match payload {
                    Payload::Absent => Resolved::Absent,
                    Payload::Single(field) => Resolved::Single(field.clone()),
                    Payload::Tuple(fields) => Resolved::Tuple(fields.clone()),
                    Payload::Nested(var) => var.resolve(role),
                };
            }
        }
        Resolved::Absent
    }

    /// Every field reachable through any branch, absent branches skipped.
    pub(crate) fn branch_fields(&self) -> Vec<Arc<Field>> {
        let mut fields = Vec::new();
        for (_, payload) in &self.cases {
            match payload {
                Payload::Absent => {}
                Payload::Single(field) => fields.push(field.clone()),
                Payload::Tuple(tuple) => fields.extend(tuple.iter().cloned()),
                Payload::Nested(var) => fields.extend(var.branch_fields()),
            }
        }
        fields
    }
}

/// A slot position inside a composite field: independently either a plain
/// field or a role-conditional [`Var`].
#[derive(Debug, Clone)]
pub enum FieldSlot {
    Field(Arc<Field>),
    Var(Var),
}

impl FieldSlot {
    pub fn resolve(&self, role: &str) -> Resolved {
        match self {
            FieldSlot::Field(field) => Resolved::Single(field.clone()),
            FieldSlot::Var(var) => var.resolve(role),
        }
    }

    /// Every field reachable through any branch of the slot.
    pub(crate) fn branch_fields(&self) -> Vec<Arc<Field>> {
        match self {
            FieldSlot::Field(field) => vec![field.clone()],
            FieldSlot::Var(var) => var.branch_fields(),
        }
    }

    /// Guard the slot behind a matcher: roles the matcher rejects resolve
    /// to absent. Used when ancestor fields propagate into a subclass.
    pub(crate) fn guarded(self, matcher: Matcher) -> FieldSlot {
        if matcher == Matcher::All {
            return self;
        }
        let payload = match self {
            FieldSlot::Field(field) => Payload::Single(field),
            FieldSlot::Var(var) => Payload::Nested(Box::new(var)),
        };
        FieldSlot::Var(Var {
            cases: vec![(matcher, payload)],
        })
    }
}

impl From<Field> for FieldSlot {
    fn from(field: Field) -> Self {
        FieldSlot::Field(Arc::new(field))
    }
}

impl From<Arc<Field>> for FieldSlot {
    fn from(field: Arc<Field>) -> Self {
        FieldSlot::Field(field)
    }
}

impl From<Var> for FieldSlot {
    fn from(var: Var) -> Self {
        FieldSlot::Var(var)
    }
}
