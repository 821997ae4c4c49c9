//! Object model, dependency resolution and ordering for declarative
//! PostgreSQL schema documents.
//!
//! A [`Database`] is loaded from a versioned document (see [`document`]) in two
//! passes so that objects may reference each other in any order. Once loaded it
//! can:
//!
//! - report what each object depends on ([`Database::dependencies`]),
//! - produce a creation order that respects those dependencies
//!   ([`Database::ordered_objects`]),
//! - compute a migration plan towards another database ([`Database::diff`]).
//!
//! ```text
//! document ──load──▶ Database ──order──▶ [Object] ──▶ renderer
//!                       │
//!                       └──diff(target)──▶ MigrationPlan
//! ```

use std::fmt;

mod database;
mod deps;
mod diff;
pub mod document;
mod error;
mod load;
mod model;
mod order;
mod refs;
mod scan;

pub use database::{Database, Namespace};
pub use deps::{Dependencies, UnresolvedCall};
pub use diff::{MigrationPlan, Operation, OperationLine};
pub use document::DocumentOrder;
pub use error::Error;
pub use model::*;
pub use order::Ordering;
pub use refs::{ObjectId, ObjectRef, QualifiedName, RoleRef, TypeRef, TypeTarget};
pub use scan::{ScannedReference, scan_references};

pub type Result<T> = std::result::Result<T, Error>;

/// Schema assumed for unqualified names.
pub const DEFAULT_SCHEMA: &str = "public";

/// The system catalog schema holding built-in types and functions.
pub const CATALOG_SCHEMA: &str = "pg_catalog";

/// The kind tag of a schema object, as used in documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ObjectKind {
    Schema,
    Table,
    Function,
    Procedure,
    View,
    CompositeType,
    EnumType,
    Aggregate,
    Sequence,
    Role,
    Trigger,
    Cast,
    Setting,
    Row,
    Operator,
}

impl ObjectKind {
    pub const ALL: [ObjectKind; 15] = [
        ObjectKind::Schema,
        ObjectKind::Table,
        ObjectKind::Function,
        ObjectKind::Procedure,
        ObjectKind::View,
        ObjectKind::CompositeType,
        ObjectKind::EnumType,
        ObjectKind::Aggregate,
        ObjectKind::Sequence,
        ObjectKind::Role,
        ObjectKind::Trigger,
        ObjectKind::Cast,
        ObjectKind::Setting,
        ObjectKind::Row,
        ObjectKind::Operator,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ObjectKind::Schema => "schema",
            ObjectKind::Table => "table",
            ObjectKind::Function => "function",
            ObjectKind::Procedure => "procedure",
            ObjectKind::View => "view",
            ObjectKind::CompositeType => "composite_type",
            ObjectKind::EnumType => "enum_type",
            ObjectKind::Aggregate => "aggregate",
            ObjectKind::Sequence => "sequence",
            ObjectKind::Role => "role",
            ObjectKind::Trigger => "trigger",
            ObjectKind::Cast => "cast",
            ObjectKind::Setting => "setting",
            ObjectKind::Row => "row",
            ObjectKind::Operator => "operator",
        }
    }

    pub fn from_tag(tag: &str) -> Option<ObjectKind> {
        ObjectKind::ALL.into_iter().find(|kind| kind.as_str() == tag)
    }

    /// Kinds that can stand in for a data type, in resolution priority order.
    pub(crate) const TYPE_LIKE: [ObjectKind; 5] = [
        ObjectKind::EnumType,
        ObjectKind::CompositeType,
        ObjectKind::Table,
        ObjectKind::View,
        ObjectKind::Aggregate,
    ];
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Name resolution settings for one database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Options {
    /// Schema implied by short-form references.
    pub default_schema: String,
    /// Schemas whose unknown types are synthesized instead of rejected.
    pub silent_schemas: Vec<String>,
    /// Schemas left out of the creation order entirely.
    pub excluded_schemas: Vec<String>,
}

impl Options {
    pub fn is_silent(&self, schema: &str) -> bool {
        schema == self.default_schema || self.silent_schemas.iter().any(|s| s == schema)
    }

    pub fn is_excluded(&self, schema: &str) -> bool {
        self.excluded_schemas.iter().any(|s| s == schema)
    }
}

impl Default for Options {
    fn default() -> Self {
        Self {
            default_schema: DEFAULT_SCHEMA.to_string(),
            silent_schemas: vec![DEFAULT_SCHEMA.to_string(), CATALOG_SCHEMA.to_string()],
            excluded_schemas: [
                CATALOG_SCHEMA,
                "information_schema",
                "pg_toast",
                "pg_temp_1",
                "pg_toast_temp_1",
                "dep_recurse",
            ]
            .map(String::from)
            .to_vec(),
        }
    }
}
