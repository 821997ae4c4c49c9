//! Schema diffing - compute the operations that migrate one database into
//! another.
//!
//! Objects are matched between the two sides by [`Identity`]: kind, schema
//! and name, plus the argument types for functions (so overloads are told
//! apart), the table for triggers and the operand types for operators.
//!
//! Operators and triggers are compared across the whole database, everything
//! else schema by schema. The plan lists, in order:
//!
//! ```text
//! - operator ...            dropped operators
//! + operator ...            new operators
//! + schema shop             per schema, new schema first
//! - function ...              dropped functions, tables, views, types
//! + table ...                 new tables, then new views
//! - column / + column / ~     column steps of modified tables
//! + type ... / + function     new types, new functions
//! ~ function ...              functions whose source changed
//! - schema old                schema dropped after its contents
//! - trigger / + trigger     dropped and new triggers
//! ```
//!
//! Column steps of one table come as drops, then adds, then type and
//! nullability changes of columns present on both sides.

use std::collections::HashSet;
use std::fmt;

use indexmap::IndexMap;
use tracing::debug;

use crate::model::*;
use crate::refs::{ObjectId, QualifiedName, TypeRef};
use crate::{DEFAULT_SCHEMA, Database, ObjectKind};

/// The operations migrating a current database into a target database.
#[derive(Debug, Clone, PartialEq)]
pub struct MigrationPlan {
    pub operations: Vec<Operation>,
    /// Types in this schema are rendered unqualified.
    pub default_schema: String,
}

impl Default for MigrationPlan {
    fn default() -> Self {
        Self {
            operations: Vec::new(),
            default_schema: DEFAULT_SCHEMA.to_string(),
        }
    }
}

impl MigrationPlan {
    /// Returns true if there are no differences.
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    /// One line per operation.
    pub fn lines(&self) -> impl Iterator<Item = OperationLine<'_>> {
        self.operations
            .iter()
            .map(|operation| operation.line(&self.default_schema))
    }
}

/// A single migration step.
#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    CreateSchema(String),
    DropSchema(String),
    CreateTable(Table),
    DropTable(Table),
    AddColumn {
        table: QualifiedName,
        column: Column,
    },
    DropColumn {
        table: QualifiedName,
        column: String,
    },
    /// Change a column's type.
    AlterColumnType {
        table: QualifiedName,
        column: String,
        from: TypeRef,
        to: TypeRef,
    },
    /// Change a column's nullability.
    AlterColumnNullable {
        table: QualifiedName,
        column: String,
        from: bool,
        to: bool,
    },
    CreateFunction(Function),
    /// Replace a function whose source changed, carrying the new version.
    ReplaceFunction(Function),
    DropFunction(Function),
    CreateView(View),
    DropView(View),
    /// Create an enum or composite type.
    CreateType(Object),
    /// Drop an enum or composite type.
    DropType(Object),
    CreateTrigger(Trigger),
    DropTrigger(Trigger),
    CreateOperator(Operator),
    DropOperator(Operator),
}

fn type_text(type_ref: &TypeRef, default_schema: &str) -> String {
    type_ref.to_text(default_schema, false)
}

fn nullability(nullable: bool) -> &'static str {
    if nullable { "nullable" } else { "not null" }
}

fn signature_text(arguments: &[Argument], default_schema: &str) -> String {
    arguments
        .iter()
        .filter(|a| a.mode.is_input())
        .map(|a| type_text(&a.data_type, default_schema))
        .collect::<Vec<_>>()
        .join(", ")
}

fn operator_text(operator: &Operator, default_schema: &str) -> String {
    let operand = |t: &Option<TypeRef>| {
        t.as_ref()
            .map_or_else(|| "none".to_string(), |t| type_text(t, default_schema))
    };
    format!(
        "{}.{} ({}, {})",
        operator.schema,
        operator.name,
        operand(&operator.left_arg),
        operand(&operator.right_arg)
    )
}

impl Operation {
    /// The plan line for this operation.
    pub fn line<'a>(&'a self, default_schema: &'a str) -> OperationLine<'a> {
        OperationLine {
            operation: self,
            default_schema,
        }
    }
}

/// An [`Operation`] rendered as one plan line, e.g. `+ table shop.order`.
#[derive(Debug, Clone, Copy)]
pub struct OperationLine<'a> {
    operation: &'a Operation,
    default_schema: &'a str,
}

impl fmt::Display for OperationLine<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let default_schema = self.default_schema;
        match self.operation {
            Operation::CreateSchema(name) => write!(f, "+ schema {name}"),
            Operation::DropSchema(name) => write!(f, "- schema {name}"),
            Operation::CreateTable(t) => write!(f, "+ table {}.{}", t.schema, t.name),
            Operation::DropTable(t) => write!(f, "- table {}.{}", t.schema, t.name),
            Operation::AddColumn { table, column } => {
                let not_null = if column.nullable { "" } else { " not null" };
                write!(
                    f,
                    "+ column {table}.{}: {}{not_null}",
                    column.name,
                    type_text(&column.data_type, default_schema)
                )
            }
            Operation::DropColumn { table, column } => write!(f, "- column {table}.{column}"),
            Operation::AlterColumnType {
                table,
                column,
                from,
                to,
            } => write!(
                f,
                "~ column {table}.{column}: {} -> {}",
                type_text(from, default_schema),
                type_text(to, default_schema)
            ),
            Operation::AlterColumnNullable {
                table,
                column,
                from,
                to,
            } => write!(
                f,
                "~ column {table}.{column}: {} -> {}",
                nullability(*from),
                nullability(*to)
            ),
            Operation::CreateFunction(func) => write!(
                f,
                "+ function {}.{}({})",
                func.schema,
                func.name,
                signature_text(&func.arguments, default_schema)
            ),
            Operation::ReplaceFunction(func) => write!(
                f,
                "~ function {}.{}({})",
                func.schema,
                func.name,
                signature_text(&func.arguments, default_schema)
            ),
            Operation::DropFunction(func) => write!(
                f,
                "- function {}.{}({})",
                func.schema,
                func.name,
                signature_text(&func.arguments, default_schema)
            ),
            Operation::CreateView(v) => write!(f, "+ view {}.{}", v.schema, v.name),
            Operation::DropView(v) => write!(f, "- view {}.{}", v.schema, v.name),
            Operation::CreateType(t) => write!(f, "+ type {}", t.ident()),
            Operation::DropType(t) => write!(f, "- type {}", t.ident()),
            Operation::CreateTrigger(t) => {
                write!(f, "+ trigger {} on {}", t.name, t.table.name)
            }
            Operation::DropTrigger(t) => write!(f, "- trigger {} on {}", t.name, t.table.name),
            Operation::CreateOperator(o) => write!(f, "+ operator {}", operator_text(o, default_schema)),
            Operation::DropOperator(o) => write!(f, "- operator {}", operator_text(o, default_schema)),
        }
    }
}

impl fmt::Display for MigrationPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            writeln!(f, "No changes detected.")?;
        } else {
            for line in self.lines() {
                writeln!(f, "{line}")?;
            }
        }
        Ok(())
    }
}

/// Objects of the given kinds, keyed by identity, in load order.
fn collect<'a>(
    database: &'a Database,
    ids: impl IntoIterator<Item = ObjectId>,
    kinds: &[ObjectKind],
) -> IndexMap<Identity, &'a Object> {
    ids.into_iter()
        .map(|id| database.object(id))
        .filter(|object| kinds.contains(&object.kind()))
        .map(|object| (object.identity(), object))
        .collect()
}

/// Both sides of one comparison.
struct Sides<'a> {
    current: IndexMap<Identity, &'a Object>,
    target: IndexMap<Identity, &'a Object>,
}

impl<'a> Sides<'a> {
    fn removed(&self) -> impl Iterator<Item = &'a Object> + '_ {
        self.current
            .iter()
            .filter(|(key, _)| !self.target.contains_key(*key))
            .map(|(_, object)| *object)
    }

    fn added(&self) -> impl Iterator<Item = &'a Object> + '_ {
        self.target
            .iter()
            .filter(|(key, _)| !self.current.contains_key(*key))
            .map(|(_, object)| *object)
    }

    /// Pairs present on both sides, in target order.
    fn common(&self) -> impl Iterator<Item = (&'a Object, &'a Object)> + '_ {
        self.target
            .iter()
            .filter_map(|(key, target)| self.current.get(key).map(|current| (*current, *target)))
    }
}

const TYPE_KINDS: [ObjectKind; 2] = [ObjectKind::EnumType, ObjectKind::CompositeType];

impl Database {
    /// Compute the plan migrating `self` (the current state) into `target`.
    pub fn diff(&self, target: &Database) -> MigrationPlan {
        let mut operations = Vec::new();
        let all = |db: &Database| db.iter().map(|(id, _)| id).collect::<Vec<_>>();

        let operators = Sides {
            current: collect(self, all(self), &[ObjectKind::Operator]),
            target: collect(target, all(target), &[ObjectKind::Operator]),
        };
        for object in operators.removed() {
            if let Object::Operator(o) = object {
                operations.push(Operation::DropOperator(o.clone()));
            }
        }
        for object in operators.added() {
            if let Object::Operator(o) = object {
                operations.push(Operation::CreateOperator(o.clone()));
            }
        }

        let mut schema_names: Vec<&str> = Vec::new();
        let mut seen = HashSet::new();
        for name in target.schemas.keys().chain(self.schemas.keys()) {
            if !self.options.is_excluded(name) && seen.insert(name.as_str()) {
                schema_names.push(name);
            }
        }
        for name in schema_names {
            diff_schema(self, target, name, &mut operations);
        }

        let triggers = Sides {
            current: collect(self, all(self), &[ObjectKind::Trigger]),
            target: collect(target, all(target), &[ObjectKind::Trigger]),
        };
        for object in triggers.removed() {
            if let Object::Trigger(t) = object {
                operations.push(Operation::DropTrigger(t.clone()));
            }
        }
        for object in triggers.added() {
            if let Object::Trigger(t) = object {
                operations.push(Operation::CreateTrigger(t.clone()));
            }
        }

        debug!(operations = operations.len(), "diff computed");
        MigrationPlan {
            operations,
            default_schema: target.options.default_schema.clone(),
        }
    }
}

fn diff_schema(current: &Database, target: &Database, name: &str, operations: &mut Vec<Operation>) {
    let current_schema = current.schema(name);
    let target_schema = target.schema(name);
    let no_members = Vec::new();
    let current_members = current_schema.map_or(&no_members, |s| &s.members);
    let target_members = target_schema.map_or(&no_members, |s| &s.members);

    let sides = |kinds: &[ObjectKind]| Sides {
        current: collect(current, current_members.iter().copied(), kinds),
        target: collect(target, target_members.iter().copied(), kinds),
    };
    let functions = sides(&[ObjectKind::Function]);
    let tables = sides(&[ObjectKind::Table]);
    let views = sides(&[ObjectKind::View]);
    let types = sides(&TYPE_KINDS);

    // The default schema always exists.
    let managed = name != target.options.default_schema;

    if current_schema.is_none() && managed {
        operations.push(Operation::CreateSchema(name.to_string()));
    }

    for object in functions.removed() {
        if let Object::Function(f) = object {
            operations.push(Operation::DropFunction(f.clone()));
        }
    }
    for object in tables.removed() {
        if let Object::Table(t) = object {
            operations.push(Operation::DropTable(t.clone()));
        }
    }
    for object in views.removed() {
        if let Object::View(v) = object {
            operations.push(Operation::DropView(v.clone()));
        }
    }
    for object in types.removed() {
        operations.push(Operation::DropType(object.clone()));
    }

    for object in tables.added() {
        if let Object::Table(t) = object {
            operations.push(Operation::CreateTable(t.clone()));
        }
    }
    for object in views.added() {
        if let Object::View(v) = object {
            operations.push(Operation::CreateView(v.clone()));
        }
    }
    for (current_table, target_table) in tables.common() {
        if let (Object::Table(c), Object::Table(t)) = (current_table, target_table) {
            operations.extend(diff_columns(c, t));
        }
    }
    for object in types.added() {
        operations.push(Operation::CreateType(object.clone()));
    }
    for object in functions.added() {
        if let Object::Function(f) = object {
            operations.push(Operation::CreateFunction(f.clone()));
        }
    }
    for (current_function, target_function) in functions.common() {
        if let (Object::Function(c), Object::Function(t)) = (current_function, target_function)
            && c.source != t.source
        {
            operations.push(Operation::ReplaceFunction(t.clone()));
        }
    }

    if target_schema.is_none() && managed {
        operations.push(Operation::DropSchema(name.to_string()));
    }
}

/// Column-level steps turning `current` into `desired`.
fn diff_columns(current: &Table, desired: &Table) -> Vec<Operation> {
    let mut operations = Vec::new();
    let table = QualifiedName::new(desired.schema.clone(), desired.name.clone());

    let desired_names: HashSet<&str> = desired.columns.iter().map(|c| c.name.as_str()).collect();
    let current_names: HashSet<&str> = current.columns.iter().map(|c| c.name.as_str()).collect();

    // Columns to drop
    for col in &current.columns {
        if !desired_names.contains(col.name.as_str()) {
            operations.push(Operation::DropColumn {
                table: table.clone(),
                column: col.name.clone(),
            });
        }
    }

    // Columns to add
    for col in &desired.columns {
        if !current_names.contains(col.name.as_str()) {
            operations.push(Operation::AddColumn {
                table: table.clone(),
                column: col.clone(),
            });
        }
    }

    // Columns in both
    for desired_col in &desired.columns {
        let Some(current_col) = current.column(&desired_col.name) else {
            continue;
        };

        if desired_col.data_type != current_col.data_type {
            operations.push(Operation::AlterColumnType {
                table: table.clone(),
                column: desired_col.name.clone(),
                from: current_col.data_type.clone(),
                to: desired_col.data_type.clone(),
            });
        }

        if desired_col.nullable != current_col.nullable {
            operations.push(Operation::AlterColumnNullable {
                table: table.clone(),
                column: desired_col.name.clone(),
                from: current_col.nullable,
                to: desired_col.nullable,
            });
        }
    }

    operations
}
