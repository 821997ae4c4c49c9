//! The in-memory object model.
//!
//! Each object kind is a plain struct. Links to other objects are
//! [`TypeRef`]/[`ObjectRef`]/[`RoleRef`] values that the loader binds once
//! every identity in the document is known. [`Object`] is the closed sum of
//! all kinds and is what the [`Database`](crate::Database) arena stores.

use std::borrow::Cow;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::ObjectKind;
use crate::refs::{ObjectRef, RoleRef, TypeRef};

/// Identity shared by every object kind.
pub trait SchemaObject {
    fn kind(&self) -> ObjectKind;

    /// Bare name of the object. Objects without a natural name (casts, rows)
    /// synthesize one.
    fn name(&self) -> Cow<'_, str>;

    /// Owning schema, or `None` for database-global objects.
    fn schema(&self) -> Option<&str>;
}

// ============================================================================
// Schemas
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct Schema {
    pub name: String,
    pub description: Option<String>,
    /// Registered because another object lives in it, not declared on its own.
    pub implicit: bool,
}

// ============================================================================
// Tables
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub data_type: TypeRef,
    pub nullable: bool,
    /// Raw SQL default expression.
    pub default: Option<String>,
    pub description: Option<String>,
    pub identity: Option<IdentityMode>,
}

impl Column {
    pub fn new(name: impl Into<String>, data_type: TypeRef) -> Self {
        Self {
            name: name.into(),
            data_type,
            nullable: true,
            default: None,
            description: None,
            identity: None,
        }
    }
}

/// `GENERATED ... AS IDENTITY` mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentityMode {
    Always,
    #[serde(rename = "by default")]
    ByDefault,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrimaryKey {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub columns: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ForeignKey {
    pub name: Option<String>,
    /// Schema of the table owning the key.
    pub schema: String,
    pub columns: Vec<String>,
    pub references: ObjectRef,
    pub referenced_columns: Vec<String>,
    pub on_update: Option<ReferentialAction>,
    pub on_delete: Option<ReferentialAction>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReferentialAction {
    #[serde(rename = "no action")]
    NoAction,
    /// `NO ACTION` spelled `none`, kept so documents write back unchanged.
    #[serde(rename = "none")]
    None,
    #[serde(rename = "restrict")]
    Restrict,
    #[serde(rename = "cascade")]
    Cascade,
    #[serde(rename = "set null")]
    SetNull,
    #[serde(rename = "set default")]
    SetDefault,
}

impl ReferentialAction {
    pub fn as_sql(self) -> &'static str {
        match self {
            ReferentialAction::NoAction | ReferentialAction::None => "NO ACTION",
            ReferentialAction::Restrict => "RESTRICT",
            ReferentialAction::Cascade => "CASCADE",
            ReferentialAction::SetNull => "SET NULL",
            ReferentialAction::SetDefault => "SET DEFAULT",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UniqueConstraint {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub columns: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckConstraint {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub expression: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExcludeConstraint {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default = "default_index_method")]
    pub index_method: String,
    pub exclusions: Vec<Exclusion>,
}

/// One `element WITH operator` pair of an exclusion constraint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Exclusion {
    pub exclude_element: String,
    pub operator: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Index {
    pub name: String,
    pub columns: Vec<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub unique: bool,
    #[serde(default = "default_index_method")]
    pub method: String,
    /// Partial index predicate.
    #[serde(default, rename = "where", skip_serializing_if = "Option::is_none")]
    pub predicate: Option<String>,
}

fn default_index_method() -> String {
    "btree".to_string()
}

#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    pub schema: String,
    pub name: String,
    pub columns: Vec<Column>,
    pub primary_key: Option<PrimaryKey>,
    pub foreign_keys: Vec<ForeignKey>,
    pub unique: Vec<UniqueConstraint>,
    pub check: Vec<CheckConstraint>,
    pub exclude: Vec<ExcludeConstraint>,
    pub inherits: Option<ObjectRef>,
    pub description: Option<String>,
    pub indexes: Vec<Index>,
}

impl Table {
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }
}

// ============================================================================
// Routines
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArgumentMode {
    #[default]
    #[serde(alias = "i")]
    In,
    #[serde(alias = "o")]
    Out,
    #[serde(alias = "b")]
    Inout,
    #[serde(alias = "v")]
    Variadic,
    /// A column of a `RETURNS TABLE` result.
    #[serde(alias = "t")]
    Table,
}

impl ArgumentMode {
    /// Whether the argument is passed by the caller.
    pub fn is_input(self) -> bool {
        matches!(
            self,
            ArgumentMode::In | ArgumentMode::Inout | ArgumentMode::Variadic
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Argument {
    pub name: Option<String>,
    pub data_type: TypeRef,
    pub mode: ArgumentMode,
    pub default: Option<String>,
}

/// Number of arguments a caller passes.
pub fn input_arity(arguments: &[Argument]) -> usize {
    arguments.iter().filter(|a| a.mode.is_input()).count()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Volatility {
    #[default]
    Volatile,
    Stable,
    Immutable,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Function {
    pub schema: String,
    pub name: String,
    pub arguments: Vec<Argument>,
    pub return_type: TypeRef,
    pub returns_set: bool,
    pub language: String,
    pub source: String,
    pub volatility: Volatility,
    pub strict: bool,
    pub description: Option<String>,
}

/// Fully qualified input argument types, which together with the name
/// identify one overload.
pub fn signature(arguments: &[Argument]) -> Vec<String> {
    arguments
        .iter()
        .filter(|a| a.mode.is_input())
        .map(|a| a.data_type.qualified_name().to_string())
        .collect()
}

impl Function {
    pub fn arity(&self) -> usize {
        input_arity(&self.arguments)
    }

    pub fn signature(&self) -> Vec<String> {
        signature(&self.arguments)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Procedure {
    pub schema: String,
    pub name: String,
    pub arguments: Vec<Argument>,
    pub language: String,
    pub source: String,
    pub description: Option<String>,
}

impl Procedure {
    pub fn arity(&self) -> usize {
        input_arity(&self.arguments)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Aggregate {
    pub schema: String,
    pub name: String,
    pub arguments: Vec<Argument>,
    /// State transition function.
    pub sfunc: ObjectRef,
    /// State value type.
    pub stype: TypeRef,
    pub final_func: Option<ObjectRef>,
    pub initial_value: Option<String>,
    pub description: Option<String>,
}

impl Aggregate {
    pub fn arity(&self) -> usize {
        input_arity(&self.arguments)
    }
}

// ============================================================================
// Views and types
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct View {
    pub schema: String,
    pub name: String,
    /// The query text, kept opaque.
    pub query: String,
    pub description: Option<String>,
}

/// An enum type. Label order is the ordinal order of the type.
#[derive(Debug, Clone, PartialEq)]
pub struct EnumType {
    pub schema: String,
    pub name: String,
    pub labels: Vec<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompositeType {
    pub schema: String,
    pub name: String,
    pub columns: Vec<Column>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Sequence {
    pub schema: String,
    pub name: String,
    pub start_value: i64,
    pub minimum_value: Option<i64>,
    pub maximum_value: Option<i64>,
    pub increment: i64,
    pub cycle: bool,
}

// ============================================================================
// Roles
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct Role {
    pub name: String,
    pub superuser: bool,
    pub inherit: bool,
    pub createrole: bool,
    pub createdb: bool,
    pub login: bool,
    /// Roles this role is granted. Membership may be cyclic.
    pub member_of: Vec<RoleRef>,
}

// ============================================================================
// Triggers
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerTiming {
    Before,
    After,
    #[serde(alias = "instead of")]
    Instead,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerEvent {
    Insert,
    Update,
    Delete,
    Truncate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerLevel {
    #[default]
    Row,
    Statement,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Trigger {
    pub name: String,
    pub table: ObjectRef,
    pub function: ObjectRef,
    pub timing: TriggerTiming,
    pub events: Vec<TriggerEvent>,
    pub level: TriggerLevel,
    /// `WHEN (...)` condition.
    pub condition: Option<String>,
    pub arguments: Vec<String>,
}

// Bits of pg_trigger.tgtype.
const TRIGGER_TYPE_ROW: u16 = 1 << 0;
const TRIGGER_TYPE_BEFORE: u16 = 1 << 1;
const TRIGGER_TYPE_INSERT: u16 = 1 << 2;
const TRIGGER_TYPE_DELETE: u16 = 1 << 3;
const TRIGGER_TYPE_UPDATE: u16 = 1 << 4;
const TRIGGER_TYPE_TRUNCATE: u16 = 1 << 5;
const TRIGGER_TYPE_INSTEAD: u16 = 1 << 6;

const TRIGGER_EVENT_BITS: [(TriggerEvent, u16); 4] = [
    (TriggerEvent::Insert, TRIGGER_TYPE_INSERT),
    (TriggerEvent::Update, TRIGGER_TYPE_UPDATE),
    (TriggerEvent::Delete, TRIGGER_TYPE_DELETE),
    (TriggerEvent::Truncate, TRIGGER_TYPE_TRUNCATE),
];

impl Trigger {
    /// Decode a catalog trigger type bitmask.
    pub fn analyze_type(tgtype: u16) -> (TriggerTiming, Vec<TriggerEvent>, TriggerLevel) {
        let timing = if tgtype & TRIGGER_TYPE_BEFORE != 0 {
            TriggerTiming::Before
        } else if tgtype & TRIGGER_TYPE_INSTEAD != 0 {
            TriggerTiming::Instead
        } else {
            TriggerTiming::After
        };

        let events = TRIGGER_EVENT_BITS
            .iter()
            .filter(|(_, bit)| tgtype & bit != 0)
            .map(|(event, _)| *event)
            .collect();

        let level = if tgtype & TRIGGER_TYPE_ROW != 0 {
            TriggerLevel::Row
        } else {
            TriggerLevel::Statement
        };

        (timing, events, level)
    }

    /// Encode timing, events and level back into a catalog bitmask.
    pub fn type_mask(&self) -> u16 {
        let mut mask = match self.timing {
            TriggerTiming::Before => TRIGGER_TYPE_BEFORE,
            TriggerTiming::Instead => TRIGGER_TYPE_INSTEAD,
            TriggerTiming::After => 0,
        };
        if self.level == TriggerLevel::Row {
            mask |= TRIGGER_TYPE_ROW;
        }
        for (event, bit) in TRIGGER_EVENT_BITS {
            if self.events.contains(&event) {
                mask |= bit;
            }
        }
        mask
    }
}

// ============================================================================
// Everything else
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct Cast {
    pub source: TypeRef,
    pub target: TypeRef,
    /// Implementing function; `None` for a binary-coercible cast.
    pub function: Option<ObjectRef>,
    pub implicit: bool,
}

/// A `SET` configuration parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct Setting {
    pub name: String,
    pub value: String,
}

/// A data row to insert into a table.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    pub table: ObjectRef,
    pub values: IndexMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Operator {
    pub schema: String,
    pub name: String,
    pub left_arg: Option<TypeRef>,
    pub right_arg: Option<TypeRef>,
    pub function: ObjectRef,
    pub commutator: Option<String>,
    pub negator: Option<String>,
}

// ============================================================================
// Identity
// ============================================================================

macro_rules! schema_bound {
    ($($ty:ident => $kind:ident),* $(,)?) => {
        $(
            impl SchemaObject for $ty {
                fn kind(&self) -> ObjectKind {
                    ObjectKind::$kind
                }

                fn name(&self) -> Cow<'_, str> {
                    Cow::Borrowed(&self.name)
                }

                fn schema(&self) -> Option<&str> {
                    Some(&self.schema)
                }
            }
        )*
    };
}

schema_bound! {
    Table => Table,
    Function => Function,
    Procedure => Procedure,
    Aggregate => Aggregate,
    View => View,
    EnumType => EnumType,
    CompositeType => CompositeType,
    Sequence => Sequence,
    Operator => Operator,
}

impl SchemaObject for Schema {
    fn kind(&self) -> ObjectKind {
        ObjectKind::Schema
    }

    fn name(&self) -> Cow<'_, str> {
        Cow::Borrowed(&self.name)
    }

    // A schema is its own namespace.
    fn schema(&self) -> Option<&str> {
        Some(&self.name)
    }
}

impl SchemaObject for Role {
    fn kind(&self) -> ObjectKind {
        ObjectKind::Role
    }

    fn name(&self) -> Cow<'_, str> {
        Cow::Borrowed(&self.name)
    }

    fn schema(&self) -> Option<&str> {
        None
    }
}

impl SchemaObject for Trigger {
    fn kind(&self) -> ObjectKind {
        ObjectKind::Trigger
    }

    fn name(&self) -> Cow<'_, str> {
        Cow::Borrowed(&self.name)
    }

    fn schema(&self) -> Option<&str> {
        Some(&self.table.name.schema)
    }
}

impl SchemaObject for Cast {
    fn kind(&self) -> ObjectKind {
        ObjectKind::Cast
    }

    fn name(&self) -> Cow<'_, str> {
        Cow::Owned(format!(
            "{} as {}",
            self.source.qualified_name(),
            self.target.qualified_name()
        ))
    }

    // Casts belong to the database, whatever schema their function lives in.
    fn schema(&self) -> Option<&str> {
        None
    }
}

impl SchemaObject for Setting {
    fn kind(&self) -> ObjectKind {
        ObjectKind::Setting
    }

    fn name(&self) -> Cow<'_, str> {
        Cow::Borrowed(&self.name)
    }

    fn schema(&self) -> Option<&str> {
        None
    }
}

impl SchemaObject for Row {
    fn kind(&self) -> ObjectKind {
        ObjectKind::Row
    }

    fn name(&self) -> Cow<'_, str> {
        Cow::Borrowed("row")
    }

    fn schema(&self) -> Option<&str> {
        Some(&self.table.name.schema)
    }
}

/// Identity of an object independent of the database it was loaded into.
///
/// Most objects are identified by kind, schema and name. `detail` tells apart
/// objects sharing a name: argument types of routines, the table of a
/// trigger, the operand types of an operator, the values of a row.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Identity {
    pub kind: ObjectKind,
    pub schema: Option<String>,
    pub name: String,
    pub detail: Vec<String>,
}

/// Any schema object.
#[derive(Debug, Clone, PartialEq)]
pub enum Object {
    Schema(Schema),
    Table(Table),
    Function(Function),
    Procedure(Procedure),
    View(View),
    CompositeType(CompositeType),
    EnumType(EnumType),
    Aggregate(Aggregate),
    Sequence(Sequence),
    Role(Role),
    Trigger(Trigger),
    Cast(Cast),
    Setting(Setting),
    Row(Row),
    Operator(Operator),
}

/// Apply `$body` to the payload of whichever variant `$object` holds.
macro_rules! dispatch {
    ($object:expr, $inner:ident => $body:expr) => {
        match $object {
            Object::Schema($inner) => $body,
            Object::Table($inner) => $body,
            Object::Function($inner) => $body,
            Object::Procedure($inner) => $body,
            Object::View($inner) => $body,
            Object::CompositeType($inner) => $body,
            Object::EnumType($inner) => $body,
            Object::Aggregate($inner) => $body,
            Object::Sequence($inner) => $body,
            Object::Role($inner) => $body,
            Object::Trigger($inner) => $body,
            Object::Cast($inner) => $body,
            Object::Setting($inner) => $body,
            Object::Row($inner) => $body,
            Object::Operator($inner) => $body,
        }
    };
}

pub(crate) use dispatch;

impl SchemaObject for Object {
    fn kind(&self) -> ObjectKind {
        dispatch!(self, o => o.kind())
    }

    fn name(&self) -> Cow<'_, str> {
        dispatch!(self, o => o.name())
    }

    fn schema(&self) -> Option<&str> {
        dispatch!(self, o => o.schema())
    }
}

impl Object {
    /// `schema.name` for schema-bound objects, the bare name otherwise.
    pub fn ident(&self) -> String {
        match (self, self.schema()) {
            (Object::Schema(s), _) => s.name.clone(),
            (_, Some(schema)) => format!("{schema}.{}", self.name()),
            (_, None) => self.name().into_owned(),
        }
    }

    /// Input arity for routines; `None` for everything else.
    pub fn arity(&self) -> Option<usize> {
        match self {
            Object::Function(f) => Some(f.arity()),
            Object::Procedure(p) => Some(p.arity()),
            Object::Aggregate(a) => Some(a.arity()),
            _ => None,
        }
    }

    /// The key that identifies this object across two databases.
    pub fn identity(&self) -> Identity {
        let detail = match self {
            Object::Function(f) => f.signature(),
            Object::Procedure(p) => signature(&p.arguments),
            Object::Aggregate(a) => signature(&a.arguments),
            Object::Trigger(t) => vec![t.table.name.name.clone()],
            Object::Operator(o) => [&o.left_arg, &o.right_arg]
                .into_iter()
                .map(|operand| match operand {
                    Some(t) => t.qualified_name().to_string(),
                    None => "none".to_string(),
                })
                .collect(),
            Object::Row(r) => r.values.iter().map(|(k, v)| format!("{k}={v}")).collect(),
            _ => Vec::new(),
        };
        Identity {
            kind: self.kind(),
            schema: self.schema().map(str::to_string),
            name: self.name().into_owned(),
            detail,
        }
    }

    pub fn as_table(&self) -> Option<&Table> {
        match self {
            Object::Table(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_function(&self) -> Option<&Function> {
        match self {
            Object::Function(f) => Some(f),
            _ => None,
        }
    }
}
