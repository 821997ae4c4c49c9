//! The versioned document format.
//!
//! A document is a mapping with a `version`, a list of `extensions` and an
//! ordered list of `objects`. Every object entry is a single-key mapping whose
//! key is the object kind:
//!
//! ```json
//! {
//!   "version": "1",
//!   "objects": [
//!     { "enum_type": { "schema": "shop", "name": "order_state", "labels": ["new", "shipped"] } },
//!     { "table": { "schema": "shop", "name": "order", "columns": [{ "name": "id", "data_type": "integer" }] } }
//!   ]
//! }
//! ```
//!
//! The types here mirror that shape one to one. Cross-object references are
//! plain strings or `{ name, schema }` pairs; the loader turns them into bound
//! references.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::model::*;
use crate::refs::{ObjectId, ObjectRef, TypeRef};
use crate::{Database, Options};

/// The only document version this crate reads and writes.
pub const FORMAT_VERSION: &str = "1";

/// A whole document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub version: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extensions: Vec<String>,
    #[serde(default)]
    pub objects: Vec<ObjectDoc>,
}

impl Document {
    pub fn to_value(&self) -> Value {
        // Every field serializes to plain JSON data, so this cannot fail.
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// One entry of `objects`, tagged by kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectDoc {
    Schema(SchemaDoc),
    Table(TableDoc),
    Function(FunctionDoc),
    Procedure(ProcedureDoc),
    View(ViewDoc),
    CompositeType(CompositeTypeDoc),
    EnumType(EnumTypeDoc),
    Aggregate(AggregateDoc),
    Sequence(SequenceDoc),
    Role(RoleDoc),
    Trigger(TriggerDoc),
    Cast(CastDoc),
    Setting(SettingDoc),
    Row(RowDoc),
    Operator(OperatorDoc),
}

/// Order of `objects` when writing a database back out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DocumentOrder {
    /// The order objects were loaded in.
    Internal,
    /// Grouped per schema, by kind.
    #[default]
    BySchema,
}

fn yes() -> bool {
    true
}

fn one() -> i64 {
    1
}

fn is_false(value: &bool) -> bool {
    !*value
}

fn is_true(value: &bool) -> bool {
    *value
}

fn is_one(value: &i64) -> bool {
    *value == 1
}

fn is_default<T: Default + PartialEq>(value: &T) -> bool {
    *value == T::default()
}

fn default_language() -> String {
    "sql".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaDoc {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// A `{ name, schema }` reference to a table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableNameDoc {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnDoc {
    pub name: String,
    pub data_type: String,
    #[serde(default = "yes")]
    pub nullable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identity: Option<IdentityMode>,
}

/// A primary key is either a bare column list or a named constraint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PrimaryKeyDoc {
    Columns(Vec<String>),
    Named(PrimaryKey),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferencesDoc {
    pub table: TableNameDoc,
    pub columns: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForeignKeyDoc {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub columns: Vec<String>,
    pub references: ReferencesDoc,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_update: Option<ReferentialAction>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_delete: Option<ReferentialAction>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableDoc {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub columns: Vec<ColumnDoc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_key: Option<PrimaryKeyDoc>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub foreign_keys: Vec<ForeignKeyDoc>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub unique: Vec<UniqueConstraint>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub check: Vec<CheckConstraint>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub exclude: Vec<ExcludeConstraint>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inherits: Option<TableNameDoc>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub indexes: Vec<Index>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArgumentDoc {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub data_type: String,
    #[serde(default, skip_serializing_if = "is_default")]
    pub mode: ArgumentMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionDoc {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
    #[serde(default)]
    pub arguments: Vec<ArgumentDoc>,
    pub return_type: String,
    #[serde(default, skip_serializing_if = "is_false")]
    pub returns_set: bool,
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default, skip_serializing_if = "is_default")]
    pub volatility: Volatility,
    #[serde(default, skip_serializing_if = "is_false")]
    pub strict: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub source: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcedureDoc {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
    #[serde(default)]
    pub arguments: Vec<ArgumentDoc>,
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub source: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateDoc {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
    #[serde(default)]
    pub arguments: Vec<ArgumentDoc>,
    pub sfunc: String,
    pub stype: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_func: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initial_value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewDoc {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub query: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnumTypeDoc {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
    #[serde(alias = "values")]
    pub labels: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompositeTypeDoc {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
    pub columns: Vec<ColumnDoc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SequenceDoc {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
    #[serde(default = "one")]
    pub startvalue: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minimumvalue: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maximumvalue: Option<i64>,
    #[serde(default = "one", skip_serializing_if = "is_one")]
    pub increment: i64,
    #[serde(default, skip_serializing_if = "is_false")]
    pub cycle: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoleDoc {
    pub name: String,
    #[serde(default, skip_serializing_if = "is_false")]
    pub superuser: bool,
    #[serde(default = "yes", skip_serializing_if = "is_true")]
    pub inherit: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub createrole: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub createdb: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub login: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub member_of: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerDoc {
    pub name: String,
    pub table: TableNameDoc,
    /// Qualified name of the trigger function.
    pub function: String,
    pub when: TriggerTiming,
    pub events: Vec<TriggerEvent>,
    #[serde(default, skip_serializing_if = "is_default")]
    pub affecteach: TriggerLevel,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub arguments: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CastDoc {
    pub source: String,
    pub target: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function: Option<String>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub implicit: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettingDoc {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowDoc {
    pub table: TableNameDoc,
    pub values: IndexMap<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperatorDoc {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub left_arg: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub right_arg: Option<String>,
    pub function: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commutator: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub negator: Option<String>,
}

// ============================================================================
// Writing
// ============================================================================

/// Converts loaded objects back into their document form.
struct Writer<'a> {
    options: &'a Options,
}

impl Writer<'_> {
    fn type_text(&self, type_ref: &TypeRef) -> String {
        type_ref.to_text(&self.options.default_schema, false)
    }

    fn routine_text(&self, object_ref: &ObjectRef) -> String {
        object_ref
            .name
            .to_text(&self.options.default_schema, false)
    }

    fn table_name(&self, object_ref: &ObjectRef) -> TableNameDoc {
        TableNameDoc {
            name: object_ref.name.name.clone(),
            schema: Some(object_ref.name.schema.clone()),
        }
    }

    fn column(&self, column: &Column) -> ColumnDoc {
        ColumnDoc {
            name: column.name.clone(),
            data_type: self.type_text(&column.data_type),
            nullable: column.nullable,
            default: column.default.clone(),
            description: column.description.clone(),
            identity: column.identity,
        }
    }

    fn argument(&self, argument: &Argument) -> ArgumentDoc {
        ArgumentDoc {
            name: argument.name.clone(),
            data_type: self.type_text(&argument.data_type),
            mode: argument.mode,
            default: argument.default.clone(),
        }
    }

    fn arguments(&self, arguments: &[Argument]) -> Vec<ArgumentDoc> {
        arguments.iter().map(|a| self.argument(a)).collect()
    }

    fn table(&self, table: &Table) -> TableDoc {
        TableDoc {
            name: table.name.clone(),
            schema: Some(table.schema.clone()),
            description: table.description.clone(),
            columns: table.columns.iter().map(|c| self.column(c)).collect(),
            primary_key: table.primary_key.as_ref().map(|pk| match pk.name {
                None => PrimaryKeyDoc::Columns(pk.columns.clone()),
                Some(_) => PrimaryKeyDoc::Named(pk.clone()),
            }),
            foreign_keys: table
                .foreign_keys
                .iter()
                .map(|fk| ForeignKeyDoc {
                    name: fk.name.clone(),
                    columns: fk.columns.clone(),
                    references: ReferencesDoc {
                        table: self.table_name(&fk.references),
                        columns: fk.referenced_columns.clone(),
                    },
                    on_update: fk.on_update,
                    on_delete: fk.on_delete,
                })
                .collect(),
            unique: table.unique.clone(),
            check: table.check.clone(),
            exclude: table.exclude.clone(),
            inherits: table.inherits.as_ref().map(|parent| self.table_name(parent)),
            indexes: table.indexes.clone(),
        }
    }

    fn object(&self, object: &Object) -> ObjectDoc {
        match object {
            Object::Schema(s) => ObjectDoc::Schema(SchemaDoc {
                name: s.name.clone(),
                description: s.description.clone(),
            }),
            Object::Table(t) => ObjectDoc::Table(self.table(t)),
            Object::Function(f) => ObjectDoc::Function(FunctionDoc {
                name: f.name.clone(),
                schema: Some(f.schema.clone()),
                arguments: self.arguments(&f.arguments),
                return_type: self.type_text(&f.return_type),
                returns_set: f.returns_set,
                language: f.language.clone(),
                volatility: f.volatility,
                strict: f.strict,
                description: f.description.clone(),
                source: f.source.clone(),
            }),
            Object::Procedure(p) => ObjectDoc::Procedure(ProcedureDoc {
                name: p.name.clone(),
                schema: Some(p.schema.clone()),
                arguments: self.arguments(&p.arguments),
                language: p.language.clone(),
                description: p.description.clone(),
                source: p.source.clone(),
            }),
            Object::View(v) => ObjectDoc::View(ViewDoc {
                name: v.name.clone(),
                schema: Some(v.schema.clone()),
                description: v.description.clone(),
                query: v.query.clone(),
            }),
            Object::CompositeType(c) => ObjectDoc::CompositeType(CompositeTypeDoc {
                name: c.name.clone(),
                schema: Some(c.schema.clone()),
                columns: c.columns.iter().map(|col| self.column(col)).collect(),
                description: c.description.clone(),
            }),
            Object::EnumType(e) => ObjectDoc::EnumType(EnumTypeDoc {
                name: e.name.clone(),
                schema: Some(e.schema.clone()),
                labels: e.labels.clone(),
                description: e.description.clone(),
            }),
            Object::Aggregate(a) => ObjectDoc::Aggregate(AggregateDoc {
                name: a.name.clone(),
                schema: Some(a.schema.clone()),
                arguments: self.arguments(&a.arguments),
                sfunc: self.routine_text(&a.sfunc),
                stype: self.type_text(&a.stype),
                final_func: a.final_func.as_ref().map(|f| self.routine_text(f)),
                initial_value: a.initial_value.clone(),
                description: a.description.clone(),
            }),
            Object::Sequence(s) => ObjectDoc::Sequence(SequenceDoc {
                name: s.name.clone(),
                schema: Some(s.schema.clone()),
                startvalue: s.start_value,
                minimumvalue: s.minimum_value,
                maximumvalue: s.maximum_value,
                increment: s.increment,
                cycle: s.cycle,
            }),
            Object::Role(r) => ObjectDoc::Role(RoleDoc {
                name: r.name.clone(),
                superuser: r.superuser,
                inherit: r.inherit,
                createrole: r.createrole,
                createdb: r.createdb,
                login: r.login,
                member_of: r.member_of.iter().map(|m| m.name.clone()).collect(),
            }),
            Object::Trigger(t) => ObjectDoc::Trigger(TriggerDoc {
                name: t.name.clone(),
                table: self.table_name(&t.table),
                function: t.function.name.to_string(),
                when: t.timing,
                events: t.events.clone(),
                affecteach: t.level,
                condition: t.condition.clone(),
                arguments: t.arguments.clone(),
            }),
            Object::Cast(c) => ObjectDoc::Cast(CastDoc {
                source: self.type_text(&c.source),
                target: self.type_text(&c.target),
                function: c.function.as_ref().map(|f| self.routine_text(f)),
                implicit: c.implicit,
            }),
            Object::Setting(s) => ObjectDoc::Setting(SettingDoc {
                name: s.name.clone(),
                value: s.value.clone(),
            }),
            Object::Row(r) => ObjectDoc::Row(RowDoc {
                table: self.table_name(&r.table),
                values: r.values.clone(),
            }),
            Object::Operator(o) => ObjectDoc::Operator(OperatorDoc {
                name: o.name.clone(),
                schema: Some(o.schema.clone()),
                left_arg: o.left_arg.as_ref().map(|t| self.type_text(t)),
                right_arg: o.right_arg.as_ref().map(|t| self.type_text(t)),
                function: self.routine_text(&o.function),
                commutator: o.commutator.clone(),
                negator: o.negator.clone(),
            }),
        }
    }
}

/// Kinds written inside a schema group, in group order.
const SCHEMA_GROUP_ORDER: [crate::ObjectKind; 8] = [
    crate::ObjectKind::Sequence,
    crate::ObjectKind::EnumType,
    crate::ObjectKind::CompositeType,
    crate::ObjectKind::Table,
    crate::ObjectKind::Function,
    crate::ObjectKind::Procedure,
    crate::ObjectKind::Aggregate,
    crate::ObjectKind::View,
];

impl Database {
    fn is_written(&self, object: &Object) -> bool {
        match object {
            Object::Schema(s) if s.implicit => false,
            _ => object
                .schema()
                .is_none_or(|schema| !self.options.is_excluded(schema)),
        }
    }

    /// Serialize this database back into a document.
    ///
    /// Schemas that were only registered because something lived in them are
    /// not written, nor is anything in an excluded schema.
    pub fn to_document(&self, order: DocumentOrder) -> Document {
        match order {
            DocumentOrder::Internal => self.document_of(self.iter().map(|(id, _)| id)),
            DocumentOrder::BySchema => {
                let mut ids = Vec::new();
                for namespace in self.schemas.values() {
                    if self.options.is_excluded(&namespace.name) {
                        continue;
                    }
                    ids.push(namespace.id);
                    for kind in SCHEMA_GROUP_ORDER {
                        ids.extend(
                            namespace
                                .members
                                .iter()
                                .copied()
                                .filter(|id| self.object(*id).kind() == kind),
                        );
                    }
                }
                ids.extend(self.iter().filter_map(|(id, o)| {
                    let grouped = matches!(o, Object::Schema(_)) || SCHEMA_GROUP_ORDER.contains(&o.kind());
                    (!grouped).then_some(id)
                }));
                self.document_of(ids)
            }
        }
    }

    /// A document holding the given objects in the given order, for example
    /// the result of [`Database::order`] or [`Database::merge_order`].
    /// Implicit schemas and excluded objects are skipped.
    pub fn document_of(&self, ids: impl IntoIterator<Item = ObjectId>) -> Document {
        let writer = Writer {
            options: &self.options,
        };
        let objects = ids
            .into_iter()
            .map(|id| self.object(id))
            .filter(|o| self.is_written(o))
            .map(|o| writer.object(o))
            .collect();

        Document {
            version: FORMAT_VERSION.to_string(),
            extensions: self.extensions.clone(),
            objects,
        }
    }
}
