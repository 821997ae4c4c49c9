//! Deferred references between schema objects.
//!
//! Every cross-object link in the model is a name, never a pointer. Loading
//! registers all identities first and then binds each reference to the
//! [`ObjectId`] of its target in a second pass, so a table may inherit from a
//! table declared further down the document, and a trigger may name a function
//! that has not been seen yet.
//!
//! Two textual forms exist: the short form (`order_state`), which implies the
//! default schema, and the qualified form (`shop.order_state`).

use std::fmt;

/// Index of an object in [`Database::objects`](crate::Database::objects).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(pub(crate) usize);

impl ObjectId {
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A schema-qualified object name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QualifiedName {
    pub schema: String,
    pub name: String,
}

impl QualifiedName {
    pub fn new(schema: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            name: name.into(),
        }
    }

    /// Parse `schema.name`, falling back to `default_schema` for a bare name.
    pub fn parse(text: &str, default_schema: &str) -> Self {
        match text.split_once('.') {
            Some((schema, name)) if !schema.is_empty() && !name.is_empty() => {
                Self::new(schema, name)
            }
            _ => Self::new(default_schema, text),
        }
    }

    /// Render as text, leaving out the schema when it is `default_schema`
    /// and `show_default` is not set.
    pub fn to_text(&self, default_schema: &str, show_default: bool) -> String {
        if !show_default && self.schema == default_schema {
            self.name.clone()
        } else {
            self.to_string()
        }
    }
}

impl fmt::Display for QualifiedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.schema, self.name)
    }
}

/// What a [`TypeRef`] resolved to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeTarget {
    /// A type-like object declared in the document.
    Object(ObjectId),
    /// A placeholder for a type nobody declared: a built-in, a catalog type,
    /// or an array type.
    Builtin,
}

/// A reference to a data type by qualified name.
///
/// Equality only considers the name, so references taken from two different
/// databases compare equal when they spell the same type.
#[derive(Debug, Clone)]
pub struct TypeRef {
    pub schema: String,
    pub name: String,
    pub(crate) target: Option<TypeTarget>,
}

impl TypeRef {
    pub fn new(schema: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            name: name.into(),
            target: None,
        }
    }

    /// Parse a type string such as `integer`, `shop.order_state` or
    /// `shop.order_state[]`.
    pub fn parse(text: &str, default_schema: &str) -> Self {
        let qn = QualifiedName::parse(text.trim(), default_schema);
        Self::new(qn.schema, qn.name)
    }

    pub fn is_array(&self) -> bool {
        self.name.ends_with("[]")
    }

    /// The element type of an array reference.
    pub fn element(&self) -> Option<TypeRef> {
        self.name
            .strip_suffix("[]")
            .map(|element| TypeRef::new(self.schema.clone(), element.trim_end()))
    }

    /// The bound target, available once the owning database finished loading.
    pub fn target(&self) -> Option<TypeTarget> {
        self.target
    }

    pub fn qualified_name(&self) -> QualifiedName {
        QualifiedName::new(self.schema.clone(), self.name.clone())
    }

    /// Render as text. Catalog types are always written bare.
    pub fn to_text(&self, default_schema: &str, show_default: bool) -> String {
        if self.schema == crate::CATALOG_SCHEMA {
            return self.name.clone();
        }
        self.qualified_name().to_text(default_schema, show_default)
    }
}

impl PartialEq for TypeRef {
    fn eq(&self, other: &Self) -> bool {
        self.schema == other.schema && self.name == other.name
    }
}

impl Eq for TypeRef {}

/// A reference to a schema-bound object: a table, a function, an operator.
#[derive(Debug, Clone)]
pub struct ObjectRef {
    pub name: QualifiedName,
    pub(crate) target: Option<ObjectId>,
}

impl ObjectRef {
    pub fn new(name: QualifiedName) -> Self {
        Self { name, target: None }
    }

    pub fn target(&self) -> Option<ObjectId> {
        self.target
    }
}

impl PartialEq for ObjectRef {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for ObjectRef {}

/// A reference to a role. Roles live outside any schema.
#[derive(Debug, Clone)]
pub struct RoleRef {
    pub name: String,
    pub(crate) target: Option<ObjectId>,
}

impl RoleRef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            target: None,
        }
    }

    pub fn target(&self) -> Option<ObjectId> {
        self.target
    }
}

impl PartialEq for RoleRef {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for RoleRef {}
