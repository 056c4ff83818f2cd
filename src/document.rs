//! Documents: named, ordered field collections and their builder.
//!
//! A document is the unit of schema definition and of recursion
//! detection. It behaves as an implicit object field whose properties are
//! the declared fields, plus metadata controlling the emitted top-level
//! keywords. Documents are immutable once built and shared as
//! `Arc<Document>`; the only post-build mutation anywhere in the graph is
//! the one-time owner binding on document reference fields.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use serde_json::{Map, Value};

use crate::compiler::{sorted_map, Compiler, Definitions};
use crate::error::{DeclarationError, GenerationError};
use crate::fields::{Additional, Attributes, DictField, Field, Walk};
use crate::registry;
use crate::roles::{FieldSlot, Matcher, Payload, Resolved, Var};
use crate::scope::ResolutionScope;

/// The draft-04 meta-schema URI, the default `$schema` value.
pub const SCHEMA_DRAFT_04: &str = "http://json-schema.org/draft-04/schema#";

static NEXT_UID: AtomicU64 = AtomicU64::new(1);

/// Per-document generation options.
#[derive(Debug, Clone)]
pub struct DocumentOptions {
    /// Whether instances may carry undeclared properties. Closed by
    /// default.
    pub additional_properties: Additional,
    pub pattern_properties: Vec<(String, FieldSlot)>,
    pub min_properties: Option<u64>,
    pub max_properties: Option<u64>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub enum_values: Option<Vec<Value>>,
    pub default: Option<Value>,
    /// Schema identifier URI; empty means no `id` keyword is emitted.
    pub id: String,
    /// Meta-schema URI; `None` omits `$schema`.
    pub schema_uri: Option<String>,
    /// Override for the key used in the `definitions` section. Falls back
    /// to `<module>.<name>`.
    pub definition_id: Option<String>,
    /// Which roles this document's fields propagate to documents that
    /// extend it.
    pub roles_to_propagate: Matcher,
}

impl Default for DocumentOptions {
    fn default() -> Self {
        DocumentOptions {
            additional_properties: Additional::Allowed(false),
            pattern_properties: Vec::new(),
            min_properties: None,
            max_properties: None,
            title: None,
            description: None,
            enum_values: None,
            default: None,
            id: String::new(),
            schema_uri: Some(SCHEMA_DRAFT_04.to_string()),
            definition_id: None,
            roles_to_propagate: Matcher::All,
        }
    }
}

/// A named, ordered collection of fields compiled into one object-type
/// schema.
#[derive(Debug)]
pub struct Document {
    uid: u64,
    name: String,
    module: String,
    options: DocumentOptions,
    fields: Vec<(String, FieldSlot)>,
    root: Arc<Field>,
}

impl Document {
    pub fn builder(name: impl Into<String>) -> DocumentBuilder {
        DocumentBuilder {
            name: name.into(),
            module: "main".into(),
            bases: Vec::new(),
            declarations: Vec::new(),
            options: DocumentOptions::default(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn module(&self) -> &str {
        &self.module
    }

    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.module, self.name)
    }

    pub fn options(&self) -> &DocumentOptions {
        &self.options
    }

    /// The effective (merged) field set, in declaration order.
    pub fn fields(&self) -> &[(String, FieldSlot)] {
        &self.fields
    }

    pub(crate) fn uid(&self) -> u64 {
        self.uid
    }

    pub(crate) fn root(&self) -> &Arc<Field> {
        &self.root
    }

    /// The key for this document in the `definitions` schema section.
    pub fn definition_id(&self) -> String {
        self.options
            .definition_id
            .clone()
            .unwrap_or_else(|| self.qualified_name())
    }

    /// Resolve one named field slot against a role.
    pub fn resolve_field(&self, name: &str, role: &str) -> Option<Resolved> {
        self.fields
            .iter()
            .find(|(field_name, _)| field_name == name)
            .map(|(_, slot)| slot.resolve(role))
    }

    pub(crate) fn child_fields(&self, role: Option<&str>) -> Vec<Arc<Field>> {
        self.root.child_fields(role)
    }

    /// Immediate fields, visiting every var branch.
    pub fn iter_fields(&self) -> std::vec::IntoIter<Arc<Field>> {
        self.child_fields(None).into_iter()
    }

    /// Immediate fields under a role, non-matching branches discarded.
    pub fn resolve_and_iter_fields(&self, role: &str) -> std::vec::IntoIter<Arc<Field>> {
        self.child_fields(Some(role)).into_iter()
    }

    /// Walk the whole field subtree (the document's own synthetic root is
    /// not yielded), visiting every var branch.
    pub fn walk(&self, through_documents: bool) -> Walk {
        Walk::new(self.child_fields(None), None, through_documents, HashSet::new())
    }

    /// Role-resolved counterpart of [`Document::walk`].
    pub fn resolve_and_walk(&self, role: &str, through_documents: bool) -> Walk {
        Walk::new(
            self.child_fields(Some(role)),
            Some(role.to_string()),
            through_documents,
            HashSet::new(),
        )
    }

    /// Whether a reference back to this document is reachable under the
    /// given role.
    pub fn is_recursive(&self, role: &str) -> bool {
        let mut visited = HashSet::new();
        visited.insert(self.uid);
        let walk = Walk::new(
            self.child_fields(Some(role)),
            Some(role.to_string()),
            true,
            visited,
        );
        for field in walk {
            if let Field::DocumentRef(doc_field) = &*field {
                if let Ok(target) = doc_field.target_document() {
                    if target.uid == self.uid {
                        return true;
                    }
                }
            }
        }
        false
    }

    /// The composable primitive: compile this document under a role and
    /// scope, returning the extracted definitions alongside the fragment.
    ///
    /// Documents listed in `ref_documents` are emitted as references
    /// wherever they occur, each compiled once into the definitions map.
    ///
    /// # Errors
    ///
    /// Returns [`GenerationError`] with the processing context of the
    /// failing node.
    pub fn get_definitions_and_schema(
        &self,
        role: &str,
        scope: &ResolutionScope,
        ordered: bool,
        ref_documents: &[Arc<Document>],
    ) -> Result<(Definitions, Value), GenerationError> {
        let mut compiler = Compiler::new(role, ordered, ref_documents);
        let fragment = compiler.compile_document(self, scope)?;
        Ok((compiler.into_definitions(), fragment))
    }

    /// Compile a complete, standalone JSON Schema document.
    ///
    /// With `ordered` set, properties follow field declaration order;
    /// otherwise property names are emitted sorted.
    ///
    /// # Errors
    ///
    /// Returns [`GenerationError`] with the processing context of the
    /// failing node.
    pub fn get_schema(&self, role: &str, ordered: bool) -> Result<Value, GenerationError> {
        let scope = ResolutionScope::new(self.options.id.as_str(), self.options.id.as_str());
        let (definitions, fragment) =
            self.get_definitions_and_schema(role, &scope, ordered, &[])?;

        let mut schema = Map::new();
        if !self.options.id.is_empty() {
            schema.insert("id".into(), Value::String(self.options.id.clone()));
        }
        if let Some(uri) = &self.options.schema_uri {
            schema.insert("$schema".into(), Value::String(uri.clone()));
        }
        if !definitions.is_empty() {
            let definitions = if ordered {
                definitions
            } else {
                sorted_map(definitions)
            };
            schema.insert("definitions".into(), Value::Object(definitions));
        }
        if let Value::Object(entries) = fragment {
            for (key, value) in entries {
                schema.insert(key, value);
            }
        }
        Ok(Value::Object(schema))
    }
}

enum Declaration {
    Field(String, FieldSlot),
    Scope(Matcher, Vec<(String, FieldSlot)>),
}

/// Builds an immutable [`Document`] from ordered field declarations,
/// role scopes and ancestor documents.
pub struct DocumentBuilder {
    name: String,
    module: String,
    bases: Vec<Arc<Document>>,
    declarations: Vec<Declaration>,
    options: DocumentOptions,
}

impl DocumentBuilder {
    pub fn module(mut self, module: impl Into<String>) -> Self {
        self.module = module.into();
        self
    }

    /// Inherit another document's fields. Bases merge first, in the order
    /// given, and this document's own declarations override same-named
    /// inherited fields in place.
    pub fn extends(mut self, base: &Arc<Document>) -> Self {
        self.bases.push(Arc::clone(base));
        self
    }

    /// Declare a field. The slot may be a plain field or a [`Var`].
    pub fn field(mut self, name: impl Into<String>, slot: impl Into<FieldSlot>) -> Self {
        self.declarations
            .push(Declaration::Field(name.into(), slot.into()));
        self
    }

    /// Declare a group of fields guarded by one matcher. A name declared
    /// in several role scopes becomes a single var combining every branch
    /// in declaration order.
    pub fn role_scope<M, I, N, S>(mut self, matcher: M, fields: I) -> Self
    where
        M: Into<Matcher>,
        I: IntoIterator<Item = (N, S)>,
        N: Into<String>,
        S: Into<FieldSlot>,
    {
        self.declarations.push(Declaration::Scope(
            matcher.into(),
            fields
                .into_iter()
                .map(|(name, slot)| (name.into(), slot.into()))
                .collect(),
        ));
        self
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.options.title = Some(title.into());
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.options.description = Some(description.into());
        self
    }

    pub fn enum_values<I: IntoIterator<Item = Value>>(mut self, values: I) -> Self {
        self.options.enum_values = Some(values.into_iter().collect());
        self
    }

    pub fn default_value(mut self, value: Value) -> Self {
        self.options.default = Some(value);
        self
    }

    /// The schema identifier URI emitted as `id`.
    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.options.id = id.into();
        self
    }

    pub fn schema_uri(mut self, schema_uri: impl Into<String>) -> Self {
        self.options.schema_uri = Some(schema_uri.into());
        self
    }

    /// Omit the `$schema` keyword entirely.
    pub fn no_schema_uri(mut self) -> Self {
        self.options.schema_uri = None;
        self
    }

    pub fn definition_id(mut self, definition_id: impl Into<String>) -> Self {
        self.options.definition_id = Some(definition_id.into());
        self
    }

    pub fn additional_properties(mut self, additional: impl Into<Additional>) -> Self {
        self.options.additional_properties = additional.into();
        self
    }

    pub fn pattern_property(mut self, pattern: impl Into<String>, slot: impl Into<FieldSlot>) -> Self {
        self.options
            .pattern_properties
            .push((pattern.into(), slot.into()));
        self
    }

    pub fn min_properties(mut self, min_properties: u64) -> Self {
        self.options.min_properties = Some(min_properties);
        self
    }

    pub fn max_properties(mut self, max_properties: u64) -> Self {
        self.options.max_properties = Some(max_properties);
        self
    }

    /// Restrict which roles this document's fields propagate to documents
    /// extending it.
    pub fn roles_to_propagate(mut self, matcher: impl Into<Matcher>) -> Self {
        self.options.roles_to_propagate = matcher.into();
        self
    }

    /// Merge declarations, build the synthetic root field, bind owners and
    /// register the document.
    ///
    /// # Errors
    ///
    /// Returns [`DeclarationError`] for malformed declarations, so that
    /// compile-time traversal can assume a well-formed graph.
    pub fn build(self) -> Result<Arc<Document>, DeclarationError> {
        let DocumentBuilder {
            name,
            module,
            bases,
            declarations,
            options,
        } = self;

        // Inherited fields first, guarded by each base's propagation
        // matcher; overriding keeps the original position.
        let mut fields: Vec<(String, FieldSlot)> = Vec::new();
        for base in &bases {
            let guard = base.options.roles_to_propagate.clone();
            for (field_name, slot) in &base.fields {
                upsert(
                    &mut fields,
                    field_name.clone(),
                    slot.clone().guarded(guard.clone()),
                );
            }
        }

        // Own declarations, in order. Scope-declared names are collected
        // as markers and materialized below; a plain declaration after
        // the scopes replaces them.
        enum Pre {
            Slot(FieldSlot),
            Scoped,
        }
        let mut own: Vec<(String, Pre)> = Vec::new();
        for declaration in &declarations {
            match declaration {
                Declaration::Field(field_name, slot) => {
                    if own
                        .iter()
                        .any(|(n, entry)| n == field_name && matches!(entry, Pre::Slot(_)))
                    {
                        return Err(DeclarationError::DuplicateField {
                            document: format!("{}.{}", module, name),
                            name: field_name.clone(),
                        });
                    }
                    upsert_pre(&mut own, field_name.clone(), Pre::Slot(slot.clone()));
                }
                Declaration::Scope(_, scope_fields) => {
                    for (field_name, _) in scope_fields {
                        upsert_pre(&mut own, field_name.clone(), Pre::Scoped);
                    }
                }
            }
        }

        for (field_name, entry) in own {
            let slot = match entry {
                Pre::Slot(slot) => slot,
                Pre::Scoped => {
                    let mut var = Var::new();
                    for declaration in &declarations {
                        if let Declaration::Scope(matcher, scope_fields) = declaration {
                            for (scope_name, slot) in scope_fields {
                                if *scope_name == field_name {
                                    var = var.case(matcher.clone(), payload_of(slot.clone()));
                                }
                            }
                        }
                    }
                    FieldSlot::Var(var)
                }
            };
            upsert(&mut fields, field_name, slot);
        }

        // The implicit object field carrying the document options.
        let root_dict = DictField {
            attrs: Attributes {
                required: false,
                title: options.title.clone(),
                description: options.description.clone(),
                enum_values: options.enum_values.clone(),
                default: options.default.clone(),
            },
            properties: fields.clone(),
            pattern_properties: options.pattern_properties.clone(),
            additional_properties: Some(options.additional_properties.clone()),
            min_properties: options.min_properties,
            max_properties: options.max_properties,
        };
        let root: Arc<Field> = Arc::new(Field::Object(root_dict));

        let document = Arc::new_cyclic(|weak: &Weak<Document>| {
            for field in Walk::new(root.child_fields(None), None, false, HashSet::new()) {
                if let Field::DocumentRef(doc_field) = &*field {
                    doc_field.set_owner(weak.clone());
                }
            }
            Document {
                uid: NEXT_UID.fetch_add(1, Ordering::Relaxed),
                name,
                module,
                options,
                fields,
                root: Arc::clone(&root),
            }
        });
        registry::register(&document);
        Ok(document)
    }
}

fn payload_of(slot: FieldSlot) -> Payload {
    match slot {
        FieldSlot::Field(field) => Payload::Single(field),
        FieldSlot::Var(var) => Payload::Nested(Box::new(var)),
    }
}

fn upsert(fields: &mut Vec<(String, FieldSlot)>, name: String, slot: FieldSlot) {
    match fields.iter_mut().find(|(n, _)| *n == name) {
        Some((_, existing)) => *existing = slot,
        None => fields.push((name, slot)),
    }
}

fn upsert_pre<T>(entries: &mut Vec<(String, T)>, name: String, entry: T) {
    match entries.iter_mut().find(|(n, _)| *n == name) {
        Some((_, existing)) => *existing = entry,
        None => entries.push((name, entry)),
    }
}
