//! The field graph model: typed field nodes and graph traversal.
//!
//! Fields form a closed variant set. Leaf fields are plain attribute bags;
//! composite fields hold their sub-structure in [`FieldSlot`] positions, so
//! any slot may independently be role-conditional. Document references are
//! the one place the graph can close a cycle.
//!
//! Traversal comes in two flavors: the unresolved walk visits every branch
//! of every var (the union view), while the role-resolved walk first
//! resolves each slot and discards non-matching branches. Both are lazy,
//! finite and restartable; a visited-documents set threaded per path keeps
//! cyclic document graphs terminating.

use std::collections::HashSet;
use std::sync::{Arc, OnceLock, Weak};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::document::Document;
use crate::error::GenerationErrorKind;
use crate::roles::{FieldSlot, Payload, Var};

/// Attributes shared by every field kind.
///
/// `required` is consumed by the enclosing object or document when it
/// assembles its `required` array; the rest are emitted on the field's own
/// fragment.
#[derive(Debug, Clone, Default)]
pub struct Attributes {
    pub required: bool,
    pub title: Option<String>,
    pub description: Option<String>,
    pub enum_values: Option<Vec<Value>>,
    pub default: Option<Value>,
}

macro_rules! common_setters {
    () => {
        /// Mark the field as required inside its enclosing object.
        pub fn required(mut self, required: bool) -> Self {
            self.attrs.required = required;
            self
        }

        pub fn title(mut self, title: impl Into<String>) -> Self {
            self.attrs.title = Some(title.into());
            self
        }

        pub fn description(mut self, description: impl Into<String>) -> Self {
            self.attrs.description = Some(description.into());
            self
        }

        pub fn enum_values<I: IntoIterator<Item = Value>>(mut self, values: I) -> Self {
            self.attrs.enum_values = Some(values.into_iter().collect());
            self
        }

        pub fn default_value(mut self, value: Value) -> Self {
            self.attrs.default = Some(value);
            self
        }
    };
}

/// A string schema.
#[derive(Debug, Clone, Default)]
pub struct StringField {
    pub(crate) attrs: Attributes,
    pub(crate) min_length: Option<u64>,
    pub(crate) max_length: Option<u64>,
    pub(crate) pattern: Option<String>,
    pub(crate) format: Option<String>,
}

impl StringField {
    pub fn new() -> Self {
        StringField::default()
    }

    common_setters!();

    pub fn min_length(mut self, min_length: u64) -> Self {
        self.min_length = Some(min_length);
        self
    }

    pub fn max_length(mut self, max_length: u64) -> Self {
        self.max_length = Some(max_length);
        self
    }

    pub fn pattern(mut self, pattern: impl Into<String>) -> Self {
        self.pattern = Some(pattern.into());
        self
    }

    /// A draft-04 `format` hint, e.g. `"date-time"`, `"email"` or `"uri"`.
    pub fn format(mut self, format: impl Into<String>) -> Self {
        self.format = Some(format.into());
        self
    }
}

/// A number schema.
#[derive(Debug, Clone, Default)]
pub struct NumberField {
    pub(crate) attrs: Attributes,
    pub(crate) multiple_of: Option<f64>,
    pub(crate) minimum: Option<f64>,
    pub(crate) maximum: Option<f64>,
    pub(crate) exclusive_minimum: bool,
    pub(crate) exclusive_maximum: bool,
}

impl NumberField {
    pub fn new() -> Self {
        NumberField::default()
    }

    common_setters!();

    pub fn multiple_of(mut self, multiple_of: f64) -> Self {
        self.multiple_of = Some(multiple_of);
        self
    }

    pub fn minimum(mut self, minimum: f64) -> Self {
        self.minimum = Some(minimum);
        self
    }

    pub fn maximum(mut self, maximum: f64) -> Self {
        self.maximum = Some(maximum);
        self
    }

    pub fn exclusive_minimum(mut self, exclusive: bool) -> Self {
        self.exclusive_minimum = exclusive;
        self
    }

    pub fn exclusive_maximum(mut self, exclusive: bool) -> Self {
        self.exclusive_maximum = exclusive;
        self
    }
}

/// An integer schema.
#[derive(Debug, Clone, Default)]
pub struct IntField {
    pub(crate) attrs: Attributes,
    pub(crate) multiple_of: Option<i64>,
    pub(crate) minimum: Option<i64>,
    pub(crate) maximum: Option<i64>,
    pub(crate) exclusive_minimum: bool,
    pub(crate) exclusive_maximum: bool,
}

impl IntField {
    pub fn new() -> Self {
        IntField::default()
    }

    common_setters!();

    pub fn multiple_of(mut self, multiple_of: i64) -> Self {
        self.multiple_of = Some(multiple_of);
        self
    }

    pub fn minimum(mut self, minimum: i64) -> Self {
        self.minimum = Some(minimum);
        self
    }

    pub fn maximum(mut self, maximum: i64) -> Self {
        self.maximum = Some(maximum);
        self
    }

    pub fn exclusive_minimum(mut self, exclusive: bool) -> Self {
        self.exclusive_minimum = exclusive;
        self
    }

    pub fn exclusive_maximum(mut self, exclusive: bool) -> Self {
        self.exclusive_maximum = exclusive;
        self
    }
}

/// A boolean schema.
#[derive(Debug, Clone, Default)]
pub struct BooleanField {
    pub(crate) attrs: Attributes,
}

impl BooleanField {
    pub fn new() -> Self {
        BooleanField::default()
    }

    common_setters!();
}

/// A null schema.
#[derive(Debug, Clone, Default)]
pub struct NullField {
    pub(crate) attrs: Attributes,
}

impl NullField {
    pub fn new() -> Self {
        NullField::default()
    }

    common_setters!();
}

/// The `items` position of an array: a single schema for every element,
/// or a fixed positional tuple of schemas.
#[derive(Debug, Clone)]
pub enum Items {
    Single(FieldSlot),
    Tuple(Vec<FieldSlot>),
}

/// The `additionalItems`/`additionalProperties` position: a boolean
/// permission or a schema.
#[derive(Debug, Clone)]
pub enum Additional {
    Allowed(bool),
    Schema(FieldSlot),
}

impl From<bool> for Additional {
    fn from(allowed: bool) -> Self {
        Additional::Allowed(allowed)
    }
}

impl From<Var> for Additional {
    fn from(var: Var) -> Self {
        Additional::Schema(FieldSlot::Var(var))
    }
}

impl From<Field> for Additional {
    fn from(field: Field) -> Self {
        Additional::Schema(FieldSlot::Field(Arc::new(field)))
    }
}

impl From<Arc<Field>> for Additional {
    fn from(field: Arc<Field>) -> Self {
        Additional::Schema(FieldSlot::Field(field))
    }
}

/// An array schema.
#[derive(Debug, Clone, Default)]
pub struct ArrayField {
    pub(crate) attrs: Attributes,
    pub(crate) items: Option<Items>,
    pub(crate) additional_items: Option<Additional>,
    pub(crate) min_items: Option<u64>,
    pub(crate) max_items: Option<u64>,
    pub(crate) unique_items: bool,
}

impl ArrayField {
    pub fn new() -> Self {
        ArrayField::default()
    }

    common_setters!();

    /// One schema applied to every element.
    pub fn items(mut self, slot: impl Into<FieldSlot>) -> Self {
        self.items = Some(Items::Single(slot.into()));
        self
    }

    /// A fixed positional tuple of schemas.
    pub fn positional_items<I, S>(mut self, slots: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<FieldSlot>,
    {
        self.items = Some(Items::Tuple(slots.into_iter().map(Into::into).collect()));
        self
    }

    pub fn additional_items(mut self, additional: impl Into<Additional>) -> Self {
        self.additional_items = Some(additional.into());
        self
    }

    pub fn min_items(mut self, min_items: u64) -> Self {
        self.min_items = Some(min_items);
        self
    }

    pub fn max_items(mut self, max_items: u64) -> Self {
        self.max_items = Some(max_items);
        self
    }

    pub fn unique_items(mut self, unique_items: bool) -> Self {
        self.unique_items = unique_items;
        self
    }
}

/// An object schema with named property slots, pattern property slots and
/// an optional additional-properties slot.
#[derive(Debug, Clone, Default)]
pub struct DictField {
    pub(crate) attrs: Attributes,
    pub(crate) properties: Vec<(String, FieldSlot)>,
    pub(crate) pattern_properties: Vec<(String, FieldSlot)>,
    pub(crate) additional_properties: Option<Additional>,
    pub(crate) min_properties: Option<u64>,
    pub(crate) max_properties: Option<u64>,
}

impl DictField {
    pub fn new() -> Self {
        DictField::default()
    }

    common_setters!();

    pub fn property(mut self, name: impl Into<String>, slot: impl Into<FieldSlot>) -> Self {
        self.properties.push((name.into(), slot.into()));
        self
    }

    pub fn pattern_property(mut self, pattern: impl Into<String>, slot: impl Into<FieldSlot>) -> Self {
        self.pattern_properties.push((pattern.into(), slot.into()));
        self
    }

    pub fn additional_properties(mut self, additional: impl Into<Additional>) -> Self {
        self.additional_properties = Some(additional.into());
        self
    }

    pub fn min_properties(mut self, min_properties: u64) -> Self {
        self.min_properties = Some(min_properties);
        self
    }

    pub fn max_properties(mut self, max_properties: u64) -> Self {
        self.max_properties = Some(max_properties);
        self
    }
}

/// A negation wrapper around one slot.
#[derive(Debug, Clone)]
pub struct NotField {
    pub(crate) attrs: Attributes,
    pub(crate) negated: FieldSlot,
}

impl NotField {
    pub fn new(negated: impl Into<FieldSlot>) -> Self {
        NotField {
            attrs: Attributes::default(),
            negated: negated.into(),
        }
    }

    common_setters!();
}

/// Which combinator keyword a [`CombinatorField`] emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Combinator {
    OneOf,
    AnyOf,
    AllOf,
}

impl Combinator {
    pub fn keyword(&self) -> &'static str {
        match self {
            Combinator::OneOf => "oneOf",
            Combinator::AnyOf => "anyOf",
            Combinator::AllOf => "allOf",
        }
    }
}

/// An ordered sequence of alternative slots under `oneOf`/`anyOf`/`allOf`.
///
/// A slot resolving to a tuple splices each tuple member in as its own
/// alternative, matching how a var over a whole alternatives list behaves.
#[derive(Debug, Clone)]
pub struct CombinatorField {
    pub(crate) attrs: Attributes,
    pub(crate) combinator: Combinator,
    pub(crate) alternatives: Vec<FieldSlot>,
}

impl CombinatorField {
    pub fn one_of<I, S>(alternatives: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<FieldSlot>,
    {
        Self::with_combinator(Combinator::OneOf, alternatives)
    }

    pub fn any_of<I, S>(alternatives: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<FieldSlot>,
    {
        Self::with_combinator(Combinator::AnyOf, alternatives)
    }

    pub fn all_of<I, S>(alternatives: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<FieldSlot>,
    {
        Self::with_combinator(Combinator::AllOf, alternatives)
    }

    fn with_combinator<I, S>(combinator: Combinator, alternatives: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<FieldSlot>,
    {
        CombinatorField {
            attrs: Attributes::default(),
            combinator,
            alternatives: alternatives.into_iter().map(Into::into).collect(),
        }
    }

    common_setters!();
}

/// The target of a document reference.
#[derive(Debug, Clone)]
pub enum Target {
    /// A reference to an already-built document. Non-owning; the registry
    /// keeps declared documents alive.
    Document(Weak<Document>),
    /// A forward reference by qualified name (`<module>.<name>`), looked
    /// up through the registry when the target is needed. This is how
    /// mutually referential document graphs are declared: the first
    /// document names the second before it exists.
    Named(String),
    /// A reference to the document the field is declared in, bound through
    /// the owner back-reference after the owning document is built.
    SelfReference,
}

/// A field whose payload is another document; the one place cycles occur.
#[derive(Debug, Clone)]
pub struct DocumentField {
    pub(crate) attrs: Attributes,
    target: Target,
    target_name: String,
    pub(crate) by_reference: bool,
    owner: OnceLock<Weak<Document>>,
}

impl DocumentField {
    pub fn new(document: &Arc<Document>) -> Self {
        DocumentField {
            attrs: Attributes::default(),
            target: Target::Document(Arc::downgrade(document)),
            target_name: document.qualified_name(),
            by_reference: false,
            owner: OnceLock::new(),
        }
    }

    /// Reference a document by qualified name, resolved through the
    /// registry when first needed. Allows forward references to documents
    /// declared later.
    pub fn named(qualified_name: impl Into<String>) -> Self {
        let qualified_name = qualified_name.into();
        DocumentField {
            attrs: Attributes::default(),
            target: Target::Named(qualified_name.clone()),
            target_name: qualified_name,
            by_reference: false,
            owner: OnceLock::new(),
        }
    }

    /// Reference the document this field will be declared in.
    pub fn self_reference() -> Self {
        DocumentField {
            attrs: Attributes::default(),
            target: Target::SelfReference,
            target_name: "self".into(),
            by_reference: false,
            owner: OnceLock::new(),
        }
    }

    common_setters!();

    /// Emit the target as a shared definition plus a reference even when
    /// the target is not recursive. Recursive targets become definitions
    /// regardless.
    pub fn by_reference(mut self, by_reference: bool) -> Self {
        self.by_reference = by_reference;
        self
    }

    pub fn target(&self) -> &Target {
        &self.target
    }

    /// One-time owner binding, applied right after the owning document is
    /// built. Later attempts on an already-owned field are ignored.
    pub(crate) fn set_owner(&self, owner: Weak<Document>) {
        let _ = self.owner.set(owner);
    }

    /// The referenced document, with self references resolved through the
    /// owner back-reference.
    pub fn target_document(&self) -> Result<Arc<Document>, GenerationErrorKind> {
        match &self.target {
            Target::Document(weak) => {
                weak.upgrade()
                    .ok_or_else(|| GenerationErrorKind::DanglingReference {
                        document: self.target_name.clone(),
                    })
            }
            Target::Named(qualified_name) => crate::registry::lookup_qualified(qualified_name)
                .ok_or_else(|| GenerationErrorKind::DanglingReference {
                    document: self.target_name.clone(),
                }),
            Target::SelfReference => self
                .owner
                .get()
                .and_then(Weak::upgrade)
                .ok_or(GenerationErrorKind::UnboundSelfReference),
        }
    }
}

/// A schema field: the closed set of node kinds the engine understands.
#[derive(Debug, Clone)]
pub enum Field {
    String(StringField),
    Number(NumberField),
    Integer(IntField),
    Boolean(BooleanField),
    Null(NullField),
    Array(ArrayField),
    Object(DictField),
    Not(NotField),
    Combinator(CombinatorField),
    DocumentRef(DocumentField),
}

macro_rules! field_variant {
    ($ty:ident => $variant:ident) => {
        impl From<$ty> for Field {
            fn from(field: $ty) -> Field {
                Field::$variant(field)
            }
        }

        impl From<$ty> for Arc<Field> {
            fn from(field: $ty) -> Arc<Field> {
                Arc::new(Field::$variant(field))
            }
        }

        impl From<$ty> for FieldSlot {
            fn from(field: $ty) -> FieldSlot {
                FieldSlot::Field(Arc::new(Field::$variant(field)))
            }
        }

        impl From<$ty> for Payload {
            fn from(field: $ty) -> Payload {
                Payload::Single(Arc::new(Field::$variant(field)))
            }
        }

        impl From<$ty> for Additional {
            fn from(field: $ty) -> Additional {
                Additional::Schema(FieldSlot::Field(Arc::new(Field::$variant(field))))
            }
        }
    };
}

field_variant!(StringField => String);
field_variant!(NumberField => Number);
field_variant!(IntField => Integer);
field_variant!(BooleanField => Boolean);
field_variant!(NullField => Null);
field_variant!(ArrayField => Array);
field_variant!(DictField => Object);
field_variant!(NotField => Not);
field_variant!(CombinatorField => Combinator);
field_variant!(DocumentField => DocumentRef);

impl Field {
    pub fn attributes(&self) -> &Attributes {
        match self {
            Field::String(f) => &f.attrs,
            Field::Number(f) => &f.attrs,
            Field::Integer(f) => &f.attrs,
            Field::Boolean(f) => &f.attrs,
            Field::Null(f) => &f.attrs,
            Field::Array(f) => &f.attrs,
            Field::Object(f) => &f.attrs,
            Field::Not(f) => &f.attrs,
            Field::Combinator(f) => &f.attrs,
            Field::DocumentRef(f) => &f.attrs,
        }
    }

    /// Immediate sub-fields, visiting every var branch.
    ///
    /// For a document reference this yields the target document's own
    /// immediate fields.
    pub fn iter_fields(&self) -> std::vec::IntoIter<Arc<Field>> {
        self.child_fields(None).into_iter()
    }

    /// Immediate sub-fields under a role, non-matching branches discarded.
    pub fn resolve_and_iter_fields(&self, role: &str) -> std::vec::IntoIter<Arc<Field>> {
        self.child_fields(Some(role)).into_iter()
    }

    /// Immediate children; `role` of `None` is the union view.
    pub(crate) fn child_fields(&self, role: Option<&str>) -> Vec<Arc<Field>> {
        let mut children = Vec::new();
        match self {
            Field::String(_)
            | Field::Number(_)
            | Field::Integer(_)
            | Field::Boolean(_)
            | Field::Null(_) => {}
            Field::Array(f) => {
                match &f.items {
                    Some(Items::Single(slot)) => children.extend(slot_fields(slot, role)),
                    Some(Items::Tuple(slots)) => {
                        for slot in slots {
                            children.extend(slot_fields(slot, role));
                        }
                    }
                    None => {}
                }
                if let Some(Additional::Schema(slot)) = &f.additional_items {
                    children.extend(slot_fields(slot, role));
                }
            }
            Field::Object(f) => {
                for (_, slot) in &f.properties {
                    children.extend(slot_fields(slot, role));
                }
                for (_, slot) in &f.pattern_properties {
                    children.extend(slot_fields(slot, role));
                }
                if let Some(Additional::Schema(slot)) = &f.additional_properties {
                    children.extend(slot_fields(slot, role));
                }
            }
            Field::Not(f) => children.extend(slot_fields(&f.negated, role)),
            Field::Combinator(f) => {
                for slot in &f.alternatives {
                    children.extend(slot_fields(slot, role));
                }
            }
            Field::DocumentRef(f) => {
                if let Ok(document) = f.target_document() {
                    children.extend(document.child_fields(role));
                }
            }
        }
        children
    }
}

fn slot_fields(slot: &FieldSlot, role: Option<&str>) -> Vec<Arc<Field>> {
    match role {
        Some(role) => slot.resolve(role).fields(),
        None => slot.branch_fields(),
    }
}

/// Depth-first pre-order traversal over a field subtree.
///
/// Lazy and restartable: constructing the walk captures nothing mutable
/// from the graph, and the same traversal re-run yields identical results.
/// Document expansion is guarded by a visited set maintained per path
/// (entered on descent, left on unwind), so self-referential and mutually
/// referential document graphs terminate.
pub struct Walk {
    role: Option<String>,
    through_documents: bool,
    visited: HashSet<u64>,
    stack: Vec<Frame>,
}

struct Frame {
    fields: std::vec::IntoIter<Arc<Field>>,
    leaving: Option<u64>,
}

impl Walk {
    pub(crate) fn new(
        seed: Vec<Arc<Field>>,
        role: Option<String>,
        through_documents: bool,
        visited: HashSet<u64>,
    ) -> Self {
        Walk {
            role,
            through_documents,
            visited,
            stack: vec![Frame {
                fields: seed.into_iter(),
                leaving: None,
            }],
        }
    }

    fn push_children(&mut self, field: &Arc<Field>) {
        match &**field {
            Field::DocumentRef(doc_field) => {
                if !self.through_documents {
                    return;
                }
                let Ok(document) = doc_field.target_document() else {
                    return;
                };
                if !self.visited.insert(document.uid()) {
                    return;
                }
                self.stack.push(Frame {
                    fields: document.child_fields(self.role.as_deref()).into_iter(),
                    leaving: Some(document.uid()),
                });
            }
            other => {
                let children = other.child_fields(self.role.as_deref());
                if !children.is_empty() {
                    self.stack.push(Frame {
                        fields: children.into_iter(),
                        leaving: None,
                    });
                }
            }
        }
    }
}

impl Iterator for Walk {
    type Item = Arc<Field>;

    fn next(&mut self) -> Option<Arc<Field>> {
        loop {
            let frame = self.stack.last_mut()?;
            match frame.fields.next() {
                Some(field) => {
                    self.push_children(&field);
                    return Some(field);
                }
                None => {
                    if let Some(uid) = frame.leaving {
                        self.visited.remove(&uid);
                    }
                    self.stack.pop();
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::roles::Var;

    fn string() -> Arc<Field> {
        Arc::new(StringField::new().into())
    }

    fn same_set(actual: Vec<Arc<Field>>, expected: &[&Arc<Field>]) -> bool {
        actual.len() == expected.len()
            && expected
                .iter()
                .all(|e| actual.iter().any(|a| Arc::ptr_eq(a, e)))
    }

    #[test]
    fn array_iteration_unions_var_branches() {
        let (a, b, c) = (string(), string(), string());
        let field: Field = ArrayField::new()
            .items(
                Var::new()
                    .case("role_1", a.clone())
                    .case("role_2", b.clone())
                    .absent_case("role_none"),
            )
            .additional_items(Arc::clone(&c))
            .into();

        assert!(same_set(field.iter_fields().collect(), &[&a, &b, &c]));
        assert!(same_set(
            field.resolve_and_iter_fields("role_1").collect(),
            &[&a, &c]
        ));
        assert!(same_set(
            field.resolve_and_iter_fields("role_none").collect(),
            &[&c]
        ));
    }

    #[test]
    fn dict_iteration_covers_all_slot_kinds() {
        let (a, b, c) = (string(), string(), string());
        let field: Field = DictField::new()
            .property("a", a.clone())
            .pattern_property("x.*", b.clone())
            .additional_properties(Arc::clone(&c))
            .into();

        assert!(same_set(field.iter_fields().collect(), &[&a, &b, &c]));
    }

    #[test]
    fn scalar_fields_have_no_children() {
        let field: Field = StringField::new().into();
        assert_eq!(field.iter_fields().count(), 0);
    }

    #[test]
    fn walk_is_restartable() {
        let a = string();
        let root: Arc<Field> = ArrayField::new().items(a.clone()).into();

        let first: Vec<_> = Walk::new(vec![root.clone()], None, false, HashSet::new()).collect();
        let second: Vec<_> = Walk::new(vec![root.clone()], None, false, HashSet::new()).collect();
        assert_eq!(first.len(), second.len());
        for (x, y) in first.iter().zip(&second) {
            assert!(Arc::ptr_eq(x, y));
        }
    }

    #[test]
    fn unbound_self_reference_errors() {
        let field = DocumentField::self_reference();
        assert_eq!(
            field.target_document().unwrap_err(),
            GenerationErrorKind::UnboundSelfReference
        );
    }
}
