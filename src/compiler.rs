//! The schema compiler.
//!
//! Walks a role-resolved field tree and assembles JSON Schema fragments,
//! extracting recursive and shared documents into a definitions map and
//! redirecting them through `$ref` pointers. One compiler instance lives
//! for one top-level compilation call; the graph itself is never touched.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde_json::{json, Map, Value};

use crate::document::Document;
use crate::error::{GenerationError, GenerationErrorKind, Step};
use crate::fields::{
    Additional, ArrayField, Attributes, CombinatorField, DictField, DocumentField, Field, IntField,
    Items, NotField, NumberField, StringField,
};
use crate::roles::Resolved;
use crate::scope::ResolutionScope;

/// Definitions extracted during one compilation, keyed by definition id.
pub type Definitions = Map<String, Value>;

pub(crate) struct Compiler<'a> {
    role: &'a str,
    ordered: bool,
    /// Documents to be emitted as references: the caller-supplied shared
    /// set plus, call-scoped, every recursive document currently being
    /// compiled.
    refs: HashSet<u64>,
    /// The caller-supplied subset of `refs`; these are also memoized into
    /// the definitions map on first encounter.
    shared: HashSet<u64>,
    definitions: Definitions,
    /// definition id -> (document uid, qualified name), for collision
    /// detection across distinct documents.
    claimed: HashMap<String, (u64, String)>,
}

impl<'a> Compiler<'a> {
    pub(crate) fn new(role: &'a str, ordered: bool, ref_documents: &[Arc<Document>]) -> Self {
        let shared: HashSet<u64> = ref_documents.iter().map(|d| d.uid()).collect();
        Compiler {
            role,
            ordered,
            refs: shared.clone(),
            shared,
            definitions: Definitions::new(),
            claimed: HashMap::new(),
        }
    }

    pub(crate) fn into_definitions(self) -> Definitions {
        self.definitions
    }

    /// Compile a document fragment, redirecting through the definitions
    /// map when the document is recursive under the active role.
    pub(crate) fn compile_document(
        &mut self,
        document: &Document,
        scope: &ResolutionScope,
    ) -> Result<Value, GenerationError> {
        let recursive = document.is_recursive(self.role);
        // The recursive reference must resolve from where the cycle
        // closes, so the definition is anchored at the document's own
        // base rather than at a transient inner scope.
        let scope = if recursive {
            scope.reset_output()
        } else {
            scope.clone()
        };
        let entered = recursive && self.refs.insert(document.uid());

        let result = self.compile_field(document.root(), &scope);
        if entered {
            self.refs.remove(&document.uid());
        }
        let fragment = result
            .map_err(|e| e.within(Step::document(document.qualified_name(), self.role)))?;
        let fragment = layer_document_id(document, fragment);

        if recursive {
            let definition_id = document.definition_id();
            self.claim(&definition_id, document)?;
            self.definitions.insert(definition_id.clone(), fragment);
            Ok(scope.create_ref(&definition_id))
        } else {
            Ok(fragment)
        }
    }

    pub(crate) fn compile_field(
        &mut self,
        field: &Field,
        scope: &ResolutionScope,
    ) -> Result<Value, GenerationError> {
        match field {
            Field::String(f) => Ok(compile_string(f)),
            Field::Number(f) => Ok(compile_number(f)),
            Field::Integer(f) => Ok(compile_integer(f)),
            Field::Boolean(f) => Ok(Value::Object(finished(typed_schema("boolean", &f.attrs), &f.attrs))),
            Field::Null(f) => Ok(Value::Object(finished(typed_schema("null", &f.attrs), &f.attrs))),
            Field::Array(f) => self.compile_array(f, scope),
            Field::Object(f) => self.compile_object(f, scope),
            Field::Not(f) => self.compile_not(f, scope),
            Field::Combinator(f) => self.compile_combinator(f, scope),
            Field::DocumentRef(f) => self.compile_document_ref(f, scope),
        }
    }

    fn compile_array(
        &mut self,
        field: &ArrayField,
        scope: &ResolutionScope,
    ) -> Result<Value, GenerationError> {
        let mut schema = typed_schema("array", &field.attrs);

        match &field.items {
            None => {}
            Some(Items::Single(slot)) => match slot.resolve(self.role) {
                Resolved::Absent => {}
                Resolved::Single(item) => {
                    let sub = self
                        .compile_field(&item, scope)
                        .map_err(|e| e.within(Step::attribute("items")))?;
                    schema.insert("items".into(), sub);
                }
                Resolved::Tuple(items) => {
                    let subs = self.compile_items_tuple(&items, scope)?;
                    if !subs.is_empty() {
                        schema.insert("items".into(), Value::Array(subs));
                    }
                }
            },
            Some(Items::Tuple(slots)) => {
                let mut subs = Vec::new();
                for (index, slot) in slots.iter().enumerate() {
                    match slot.resolve(self.role) {
                        Resolved::Absent => {}
                        Resolved::Single(item) => subs.push(
                            self.compile_field(&item, scope)
                                .map_err(|e| e.within(Step::item(index)).within(Step::attribute("items")))?,
                        ),
                        Resolved::Tuple(items) => {
                            for item in items {
                                subs.push(self.compile_field(&item, scope).map_err(|e| {
                                    e.within(Step::item(index)).within(Step::attribute("items"))
                                })?);
                            }
                        }
                    }
                }
                if !subs.is_empty() {
                    schema.insert("items".into(), Value::Array(subs));
                }
            }
        }

        if let Some(additional) = &field.additional_items {
            self.compile_additional(additional, scope, "additionalItems", &mut schema)?;
        }
        if let Some(min_items) = field.min_items {
            schema.insert("minItems".into(), json!(min_items));
        }
        if let Some(max_items) = field.max_items {
            schema.insert("maxItems".into(), json!(max_items));
        }
        if field.unique_items {
            schema.insert("uniqueItems".into(), Value::Bool(true));
        }
        Ok(Value::Object(finished(schema, &field.attrs)))
    }

    fn compile_items_tuple(
        &mut self,
        items: &[Arc<Field>],
        scope: &ResolutionScope,
    ) -> Result<Vec<Value>, GenerationError> {
        let mut subs = Vec::new();
        for (index, item) in items.iter().enumerate() {
            subs.push(
                self.compile_field(item, scope)
                    .map_err(|e| e.within(Step::item(index)).within(Step::attribute("items")))?,
            );
        }
        Ok(subs)
    }

    fn compile_object(
        &mut self,
        field: &DictField,
        scope: &ResolutionScope,
    ) -> Result<Value, GenerationError> {
        let mut schema = typed_schema("object", &field.attrs);
        let mut required = Vec::new();

        if !field.properties.is_empty() {
            let mut compiled: Vec<(String, Value, bool)> = Vec::new();
            for (name, slot) in &field.properties {
                match slot.resolve(self.role) {
                    Resolved::Absent => {}
                    Resolved::Single(property) => {
                        let sub = self
                            .compile_field(&property, scope)
                            .map_err(|e| e.within(Step::field(name)))?;
                        compiled.push((name.clone(), sub, property.attributes().required));
                    }
                    Resolved::Tuple(_) => {
                        return Err(GenerationError::from(GenerationErrorKind::UnexpectedTuple {
                            role: self.role.to_string(),
                        })
                        .within(Step::field(name)))
                    }
                }
            }
            if !self.ordered {
                compiled.sort_by(|a, b| a.0.cmp(&b.0));
            }
            let mut properties = Map::new();
            for (name, sub, is_required) in compiled {
                if is_required {
                    required.push(Value::String(name.clone()));
                }
                properties.insert(name, sub);
            }
            schema.insert("properties".into(), Value::Object(properties));
        }

        if !field.pattern_properties.is_empty() {
            let mut compiled: Vec<(String, Value)> = Vec::new();
            for (pattern, slot) in &field.pattern_properties {
                match slot.resolve(self.role) {
                    Resolved::Absent => {}
                    Resolved::Single(property) => {
                        let sub = self
                            .compile_field(&property, scope)
                            .map_err(|e| e.within(Step::field(pattern)))?;
                        compiled.push((pattern.clone(), sub));
                    }
                    Resolved::Tuple(_) => {
                        return Err(GenerationError::from(GenerationErrorKind::UnexpectedTuple {
                            role: self.role.to_string(),
                        })
                        .within(Step::field(pattern)))
                    }
                }
            }
            if !self.ordered {
                compiled.sort_by(|a, b| a.0.cmp(&b.0));
            }
            schema.insert(
                "patternProperties".into(),
                Value::Object(compiled.into_iter().collect()),
            );
        }

        if let Some(additional) = &field.additional_properties {
            self.compile_additional(additional, scope, "additionalProperties", &mut schema)?;
        }
        if !required.is_empty() {
            schema.insert("required".into(), Value::Array(required));
        }
        if let Some(min_properties) = field.min_properties {
            schema.insert("minProperties".into(), json!(min_properties));
        }
        if let Some(max_properties) = field.max_properties {
            schema.insert("maxProperties".into(), json!(max_properties));
        }
        Ok(Value::Object(finished(schema, &field.attrs)))
    }

    fn compile_additional(
        &mut self,
        additional: &Additional,
        scope: &ResolutionScope,
        keyword: &'static str,
        schema: &mut Map<String, Value>,
    ) -> Result<(), GenerationError> {
        match additional {
            Additional::Allowed(allowed) => {
                schema.insert(keyword.into(), Value::Bool(*allowed));
            }
            Additional::Schema(slot) => match slot.resolve(self.role) {
                Resolved::Absent => {}
                Resolved::Single(field) => {
                    let sub = self
                        .compile_field(&field, scope)
                        .map_err(|e| e.within(Step::attribute(keyword)))?;
                    schema.insert(keyword.into(), sub);
                }
                Resolved::Tuple(_) => {
                    return Err(GenerationError::from(GenerationErrorKind::UnexpectedTuple {
                        role: self.role.to_string(),
                    })
                    .within(Step::attribute(keyword)))
                }
            },
        }
        Ok(())
    }

    fn compile_not(
        &mut self,
        field: &NotField,
        scope: &ResolutionScope,
    ) -> Result<Value, GenerationError> {
        let mut schema = untyped_schema(&field.attrs);
        match field.negated.resolve(self.role) {
            Resolved::Absent => {
                return Err(GenerationError::from(GenerationErrorKind::AbsentNotOperand {
                    role: self.role.to_string(),
                })
                .within(Step::attribute("not")))
            }
            Resolved::Single(negated) => {
                let sub = self
                    .compile_field(&negated, scope)
                    .map_err(|e| e.within(Step::attribute("not")))?;
                schema.insert("not".into(), sub);
            }
            Resolved::Tuple(_) => {
                return Err(GenerationError::from(GenerationErrorKind::UnexpectedTuple {
                    role: self.role.to_string(),
                })
                .within(Step::attribute("not")))
            }
        }
        Ok(Value::Object(finished(schema, &field.attrs)))
    }

    fn compile_combinator(
        &mut self,
        field: &CombinatorField,
        scope: &ResolutionScope,
    ) -> Result<Value, GenerationError> {
        let keyword = field.combinator.keyword();
        let mut subs = Vec::new();
        for (index, slot) in field.alternatives.iter().enumerate() {
            match slot.resolve(self.role) {
                Resolved::Absent => {}
                Resolved::Single(alternative) => subs.push(
                    self.compile_field(&alternative, scope)
                        .map_err(|e| e.within(Step::item(index)).within(Step::attribute(keyword)))?,
                ),
                // A tuple resolved in an alternative position splices each
                // member in as its own alternative.
                Resolved::Tuple(alternatives) => {
                    for alternative in alternatives {
                        subs.push(self.compile_field(&alternative, scope).map_err(|e| {
                            e.within(Step::item(index)).within(Step::attribute(keyword))
                        })?);
                    }
                }
            }
        }
        if subs.is_empty() {
            return Err(GenerationErrorKind::EmptyCombinator {
                keyword,
                role: self.role.to_string(),
            }
            .into());
        }
        let mut schema = untyped_schema(&field.attrs);
        schema.insert(keyword.into(), Value::Array(subs));
        Ok(Value::Object(finished(schema, &field.attrs)))
    }

    fn compile_document_ref(
        &mut self,
        field: &DocumentField,
        scope: &ResolutionScope,
    ) -> Result<Value, GenerationError> {
        let target = field.target_document().map_err(GenerationError::from)?;
        let definition_id = target.definition_id();

        if self.refs.contains(&target.uid()) {
            if self.shared.contains(&target.uid()) {
                self.ensure_definition(&target, scope)?;
            }
            return Ok(scope.create_ref(&definition_id));
        }
        if field.by_reference {
            self.ensure_definition(&target, scope)?;
            return Ok(scope.create_ref(&definition_id));
        }
        self.compile_document(&target, &scope.derive(&target.options().id))
    }

    /// Compile `target` into the definitions map exactly once.
    ///
    /// The definition id is claimed before compiling, so a chain of shared
    /// targets that closes a cycle settles into references instead of
    /// re-entering this compile. A recursive target stores its own
    /// definition while compiling, in which case the reference fragment it
    /// returns is discarded here and the stored definition left untouched.
    fn ensure_definition(
        &mut self,
        target: &Arc<Document>,
        scope: &ResolutionScope,
    ) -> Result<(), GenerationError> {
        let definition_id = target.definition_id();
        if let Some((uid, _)) = self.claimed.get(&definition_id) {
            if *uid == target.uid() {
                // Compiled already, or being compiled further up the stack.
                return Ok(());
            }
        }
        self.claim(&definition_id, target)?;
        let fragment = self.compile_document(target, &scope.derive(&target.options().id))?;
        if !self.definitions.contains_key(&definition_id) {
            self.definitions.insert(definition_id, fragment);
        }
        Ok(())
    }

    fn claim(&mut self, definition_id: &str, document: &Document) -> Result<(), GenerationError> {
        match self.claimed.get(definition_id) {
            Some((uid, first)) if *uid != document.uid() => {
                Err(GenerationErrorKind::DefinitionCollision {
                    definition_id: definition_id.to_string(),
                    first: first.clone(),
                    second: document.qualified_name(),
                }
                .into())
            }
            Some(_) => Ok(()),
            None => {
                self.claimed.insert(
                    definition_id.to_string(),
                    (document.uid(), document.qualified_name()),
                );
                Ok(())
            }
        }
    }
}

fn layer_document_id(document: &Document, fragment: Value) -> Value {
    let id = &document.options().id;
    if id.is_empty() {
        return fragment;
    }
    let mut schema = Map::new();
    schema.insert("id".into(), Value::String(id.clone()));
    if let Value::Object(entries) = fragment {
        for (key, value) in entries {
            schema.insert(key, value);
        }
    }
    Value::Object(schema)
}

fn compile_string(field: &StringField) -> Value {
    let mut schema = typed_schema("string", &field.attrs);
    if let Some(min_length) = field.min_length {
        schema.insert("minLength".into(), json!(min_length));
    }
    if let Some(max_length) = field.max_length {
        schema.insert("maxLength".into(), json!(max_length));
    }
    if let Some(pattern) = &field.pattern {
        schema.insert("pattern".into(), Value::String(pattern.clone()));
    }
    if let Some(format) = &field.format {
        schema.insert("format".into(), Value::String(format.clone()));
    }
    Value::Object(finished(schema, &field.attrs))
}

fn compile_number(field: &NumberField) -> Value {
    let mut schema = typed_schema("number", &field.attrs);
    if let Some(multiple_of) = field.multiple_of {
        schema.insert("multipleOf".into(), json!(multiple_of));
    }
    if let Some(minimum) = field.minimum {
        schema.insert("minimum".into(), json!(minimum));
    }
    if let Some(maximum) = field.maximum {
        schema.insert("maximum".into(), json!(maximum));
    }
    if field.exclusive_minimum {
        schema.insert("exclusiveMinimum".into(), Value::Bool(true));
    }
    if field.exclusive_maximum {
        schema.insert("exclusiveMaximum".into(), Value::Bool(true));
    }
    Value::Object(finished(schema, &field.attrs))
}

fn compile_integer(field: &IntField) -> Value {
    let mut schema = typed_schema("integer", &field.attrs);
    if let Some(multiple_of) = field.multiple_of {
        schema.insert("multipleOf".into(), json!(multiple_of));
    }
    if let Some(minimum) = field.minimum {
        schema.insert("minimum".into(), json!(minimum));
    }
    if let Some(maximum) = field.maximum {
        schema.insert("maximum".into(), json!(maximum));
    }
    if field.exclusive_minimum {
        schema.insert("exclusiveMinimum".into(), Value::Bool(true));
    }
    if field.exclusive_maximum {
        schema.insert("exclusiveMaximum".into(), Value::Bool(true));
    }
    Value::Object(finished(schema, &field.attrs))
}

fn typed_schema(type_name: &str, attrs: &Attributes) -> Map<String, Value> {
    let mut schema = Map::new();
    schema.insert("type".into(), Value::String(type_name.to_string()));
    insert_common_prefix(&mut schema, attrs);
    schema
}

fn untyped_schema(attrs: &Attributes) -> Map<String, Value> {
    let mut schema = Map::new();
    insert_common_prefix(&mut schema, attrs);
    schema
}

fn insert_common_prefix(schema: &mut Map<String, Value>, attrs: &Attributes) {
    if let Some(title) = &attrs.title {
        schema.insert("title".into(), Value::String(title.clone()));
    }
    if let Some(description) = &attrs.description {
        schema.insert("description".into(), Value::String(description.clone()));
    }
}

fn finished(mut schema: Map<String, Value>, attrs: &Attributes) -> Map<String, Value> {
    if let Some(enum_values) = &attrs.enum_values {
        schema.insert("enum".into(), Value::Array(enum_values.clone()));
    }
    if let Some(default) = &attrs.default {
        schema.insert("default".into(), default.clone());
    }
    schema
}

/// Re-key a map in lexicographic order.
pub(crate) fn sorted_map(map: Map<String, Value>) -> Map<String, Value> {
    let mut entries: Vec<(String, Value)> = map.into_iter().collect();
    entries.sort_by(|a, b| a.0.cmp(&b.0));
    entries.into_iter().collect()
}
