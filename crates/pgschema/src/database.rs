//! The object arena and name lookups.

use std::collections::HashMap;

use indexmap::IndexMap;
use tracing::trace;

use crate::deps::Dependencies;
use crate::model::{Object, Schema, SchemaObject};
use crate::refs::{ObjectId, QualifiedName, TypeRef, TypeTarget};
use crate::{Error, ObjectKind, Options, Result};

/// A schema's slot in the database: the id of its own [`Schema`] object plus
/// the objects it owns, in load order.
#[derive(Debug, Clone, PartialEq)]
pub struct Namespace {
    pub name: String,
    pub id: ObjectId,
    pub members: Vec<ObjectId>,
}

/// A loaded schema document.
///
/// All objects live in one flat arena indexed by [`ObjectId`]; schemas, roles
/// and the name index only hold ids into it. A database is immutable once
/// loaded.
#[derive(Debug, Clone, Default)]
pub struct Database {
    pub(crate) options: Options,
    pub(crate) schemas: IndexMap<String, Namespace>,
    pub(crate) objects: Vec<Object>,
    pub(crate) extensions: Vec<String>,
    pub(crate) roles: IndexMap<String, ObjectId>,
    pub(crate) by_name: HashMap<QualifiedName, Vec<ObjectId>>,
    pub(crate) dependencies: Vec<Dependencies>,
}

impl Database {
    /// An empty database.
    pub fn new(options: Options) -> Self {
        Self {
            options,
            ..Self::default()
        }
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    pub fn objects(&self) -> &[Object] {
        &self.objects
    }

    pub fn object(&self, id: ObjectId) -> &Object {
        &self.objects[id.0]
    }

    /// Every object with its id, in load order.
    pub fn iter(&self) -> impl Iterator<Item = (ObjectId, &Object)> {
        self.objects
            .iter()
            .enumerate()
            .map(|(index, object)| (ObjectId(index), object))
    }

    pub fn schemas(&self) -> impl Iterator<Item = &Namespace> {
        self.schemas.values()
    }

    pub fn schema(&self, name: &str) -> Option<&Namespace> {
        self.schemas.get(name)
    }

    pub fn extensions(&self) -> &[String] {
        &self.extensions
    }

    pub fn role(&self, name: &str) -> Option<ObjectId> {
        self.roles.get(name).copied()
    }

    /// All objects in `schema` called `name`, in load order. Overloads share
    /// a name, so there may be several.
    pub fn named(&self, schema: &str, name: &str) -> &[ObjectId] {
        self.by_name
            .get(&QualifiedName::new(schema, name))
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn find(&self, kind: ObjectKind, schema: &str, name: &str) -> Option<ObjectId> {
        self.named(schema, name)
            .iter()
            .copied()
            .find(|id| self.object(*id).kind() == kind)
    }

    /// Find a function by name, preferring the overload taking `arity`
    /// arguments and falling back to the first overload declared.
    pub fn find_function(&self, name: &QualifiedName, arity: Option<usize>) -> Option<ObjectId> {
        let mut overloads = self
            .named(&name.schema, &name.name)
            .iter()
            .copied()
            .filter(|id| self.object(*id).kind() == ObjectKind::Function)
            .peekable();
        let first = overloads.peek().copied();
        overloads
            .find(|id| arity.is_some() && self.object(*id).arity() == arity)
            .or(first)
    }

    /// Resolve a type reference against the declared objects.
    ///
    /// Enum types win over composite types, which win over tables, then
    /// views, then aggregates. A name nobody declared is a built-in when it
    /// lives in a silent schema or denotes an array.
    pub fn resolve_type(&self, type_ref: &TypeRef) -> Result<TypeTarget> {
        let candidates = self.named(&type_ref.schema, &type_ref.name);
        for kind in ObjectKind::TYPE_LIKE {
            if let Some(id) = candidates
                .iter()
                .copied()
                .find(|id| self.object(*id).kind() == kind)
            {
                return Ok(TypeTarget::Object(id));
            }
        }

        if self.options.is_silent(&type_ref.schema) || type_ref.is_array() {
            trace!(schema = %type_ref.schema, name = %type_ref.name, "synthesized built-in type");
            return Ok(TypeTarget::Builtin);
        }

        Err(Error::TypeNotFound {
            schema: type_ref.schema.clone(),
            name: type_ref.name.clone(),
        })
    }

    /// The target of a reference, using the binding made at load time when
    /// there is one.
    pub fn type_target(&self, type_ref: &TypeRef) -> Result<TypeTarget> {
        match type_ref.target() {
            Some(target) => Ok(target),
            None => self.resolve_type(type_ref),
        }
    }

    /// Register a schema, or return the one already registered under `name`.
    ///
    /// Declaring a schema that was only registered implicitly so far makes
    /// it explicit and takes over the description.
    pub(crate) fn register_schema(&mut self, name: &str, description: Option<String>, implicit: bool) -> ObjectId {
        if let Some(namespace) = self.schemas.get(name) {
            let id = namespace.id;
            if implicit {
                return id;
            }
            if let Object::Schema(schema) = &mut self.objects[id.0] {
                schema.implicit = false;
                if description.is_some() {
                    schema.description = description;
                }
            }
            return id;
        }

        trace!(schema = name, implicit, "registering schema");
        let id = ObjectId(self.objects.len());
        self.objects.push(Object::Schema(Schema {
            name: name.to_string(),
            description,
            implicit,
        }));
        self.schemas.insert(
            name.to_string(),
            Namespace {
                name: name.to_string(),
                id,
                members: Vec::new(),
            },
        );
        id
    }

    /// Add an object to the arena, registering its schema when needed.
    pub(crate) fn push(&mut self, object: Object) -> ObjectId {
        if let Object::Schema(schema) = object {
            return self.register_schema(&schema.name, schema.description, schema.implicit);
        }
        if let Some(schema) = object.schema() {
            let schema = schema.to_string();
            self.register_schema(&schema, None, true);
        }

        let id = ObjectId(self.objects.len());
        if let Some(schema) = object.schema() {
            self.by_name
                .entry(QualifiedName::new(schema, object.name()))
                .or_default()
                .push(id);
            if let Some(namespace) = self.schemas.get_mut(schema) {
                namespace.members.push(id);
            }
        }
        if let Object::Role(role) = &object {
            self.roles.insert(role.name.clone(), id);
        }
        self.objects.push(object);
        id
    }
}
