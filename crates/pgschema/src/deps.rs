//! What each object needs to exist before it can be created.
//!
//! Dependencies are computed once, right after loading, from the bound
//! references of every object plus a scan of function and view bodies (see
//! [`scan`](crate::scan)).

use std::fmt;

use indexmap::IndexSet;
use tracing::debug;

use crate::model::*;
use crate::refs::{ObjectId, ObjectRef, QualifiedName, TypeRef, TypeTarget};
use crate::scan::{ScannedReference, scan_references};
use crate::{Database, ObjectKind};

/// The dependency set of one object.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dependencies {
    objects: IndexSet<ObjectId>,
    unresolved: Vec<UnresolvedCall>,
}

impl Dependencies {
    /// Objects depended on, in discovery order.
    pub fn objects(&self) -> impl Iterator<Item = ObjectId> + '_ {
        self.objects.iter().copied()
    }

    pub fn contains(&self, id: ObjectId) -> bool {
        self.objects.contains(&id)
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Calls found in a body that no overload of the called name accepts.
    pub fn unresolved(&self) -> &[UnresolvedCall] {
        &self.unresolved
    }
}

/// A scanned call whose argument count matches none of the routines declared
/// under that name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnresolvedCall {
    pub name: QualifiedName,
    pub arity: usize,
}

impl fmt::Display for UnresolvedCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "no overload of {} takes {} argument{}",
            self.name,
            self.arity,
            if self.arity == 1 { "" } else { "s" }
        )
    }
}

pub(crate) struct Collector<'a> {
    database: &'a Database,
    deps: Dependencies,
}

impl Collector<'_> {
    fn add(&mut self, id: ObjectId) {
        self.deps.objects.insert(id);
    }

    fn schema(&mut self, name: &str) {
        if let Some(namespace) = self.database.schema(name) {
            self.add(namespace.id);
        }
    }

    fn type_ref(&mut self, type_ref: &TypeRef) {
        match self.database.type_target(type_ref) {
            Ok(TypeTarget::Object(id)) => self.add(id),
            Ok(TypeTarget::Builtin) => {
                // `x.t[]` is synthesized, but `x.t` may be declared.
                if let Some(element) = type_ref.element()
                    && let Ok(TypeTarget::Object(id)) = self.database.resolve_type(&element)
                {
                    self.add(id);
                }
            }
            Err(_) => {}
        }
    }

    fn object_ref(&mut self, object_ref: &ObjectRef) {
        if let Some(id) = object_ref.target() {
            self.add(id);
        }
    }

    fn arguments(&mut self, arguments: &[Argument]) {
        for argument in arguments {
            self.type_ref(&argument.data_type);
        }
    }

    fn columns(&mut self, columns: &[Column]) {
        for column in columns {
            self.type_ref(&column.data_type);
        }
    }

    fn text(&mut self, text: &str) {
        for reference in scan_references(text) {
            match reference {
                ScannedReference::Name(name) => {
                    for id in self.database.named(&name.schema, &name.name) {
                        self.add(*id);
                    }
                }
                ScannedReference::Call { name, arity } => {
                    let routines: Vec<ObjectId> = self
                        .database
                        .named(&name.schema, &name.name)
                        .iter()
                        .copied()
                        .filter(|id| self.database.object(*id).arity().is_some())
                        .collect();
                    if routines.is_empty() {
                        continue;
                    }

                    let mut matched = false;
                    for id in routines {
                        if self.database.object(id).arity() == Some(arity) {
                            self.add(id);
                            matched = true;
                        }
                    }
                    if !matched {
                        debug!(call = %name, arity, "no overload matches call");
                        let call = UnresolvedCall { name, arity };
                        if !self.deps.unresolved.contains(&call) {
                            self.deps.unresolved.push(call);
                        }
                    }
                }
            }
        }
    }
}

/// Per-kind dependency rules.
pub(crate) trait DependsOn {
    fn collect(&self, deps: &mut Collector<'_>);
}

impl DependsOn for Schema {
    fn collect(&self, _: &mut Collector<'_>) {}
}

impl DependsOn for Table {
    fn collect(&self, deps: &mut Collector<'_>) {
        deps.schema(&self.schema);
        deps.columns(&self.columns);
        for fk in &self.foreign_keys {
            deps.object_ref(&fk.references);
        }
        if let Some(parent) = &self.inherits {
            deps.object_ref(parent);
        }
    }
}

impl DependsOn for Function {
    fn collect(&self, deps: &mut Collector<'_>) {
        deps.schema(&self.schema);
        deps.arguments(&self.arguments);
        deps.type_ref(&self.return_type);
        deps.text(&self.source);
    }
}

impl DependsOn for Procedure {
    fn collect(&self, deps: &mut Collector<'_>) {
        deps.schema(&self.schema);
        deps.arguments(&self.arguments);
        deps.text(&self.source);
    }
}

impl DependsOn for Aggregate {
    fn collect(&self, deps: &mut Collector<'_>) {
        deps.schema(&self.schema);
        deps.arguments(&self.arguments);
        deps.type_ref(&self.stype);
        deps.object_ref(&self.sfunc);
        if let Some(final_func) = &self.final_func {
            deps.object_ref(final_func);
        }
    }
}

impl DependsOn for View {
    fn collect(&self, deps: &mut Collector<'_>) {
        deps.schema(&self.schema);
        deps.text(&self.query);
    }
}

impl DependsOn for CompositeType {
    fn collect(&self, deps: &mut Collector<'_>) {
        deps.schema(&self.schema);
        deps.columns(&self.columns);
    }
}

impl DependsOn for EnumType {
    fn collect(&self, deps: &mut Collector<'_>) {
        deps.schema(&self.schema);
    }
}

impl DependsOn for Sequence {
    fn collect(&self, deps: &mut Collector<'_>) {
        deps.schema(&self.schema);
    }
}

impl DependsOn for Role {
    fn collect(&self, deps: &mut Collector<'_>) {
        for membership in &self.member_of {
            if let Some(id) = membership.target() {
                deps.add(id);
            }
        }
    }
}

impl DependsOn for Trigger {
    fn collect(&self, deps: &mut Collector<'_>) {
        deps.schema(&self.table.name.schema);
        deps.object_ref(&self.table);
        deps.object_ref(&self.function);
    }
}

impl DependsOn for Cast {
    fn collect(&self, deps: &mut Collector<'_>) {
        deps.type_ref(&self.source);
        deps.type_ref(&self.target);
        if let Some(function) = &self.function {
            deps.object_ref(function);
        }
    }
}

impl DependsOn for Setting {
    fn collect(&self, _: &mut Collector<'_>) {}
}

impl DependsOn for Row {
    fn collect(&self, deps: &mut Collector<'_>) {
        deps.schema(&self.table.name.schema);
        deps.object_ref(&self.table);
    }
}

impl DependsOn for Operator {
    fn collect(&self, deps: &mut Collector<'_>) {
        deps.schema(&self.schema);
        for operand in [&self.left_arg, &self.right_arg].into_iter().flatten() {
            deps.type_ref(operand);
        }
        deps.object_ref(&self.function);
    }
}

impl DependsOn for Object {
    fn collect(&self, deps: &mut Collector<'_>) {
        crate::model::dispatch!(self, o => o.collect(deps))
    }
}

impl Database {
    pub(crate) fn collect_dependencies(&self, object: &Object) -> Dependencies {
        let mut collector = Collector {
            database: self,
            deps: Dependencies::default(),
        };
        object.collect(&mut collector);
        collector.deps
    }

    /// The dependency set of one object.
    pub fn dependencies(&self, id: ObjectId) -> &Dependencies {
        &self.dependencies[id.0]
    }

    /// Every object with its dependency set, in load order.
    pub fn dependency_graph(&self) -> impl Iterator<Item = (ObjectId, &Dependencies)> {
        self.dependencies
            .iter()
            .enumerate()
            .map(|(index, deps)| (ObjectId(index), deps))
    }

    /// Scanned calls that matched no overload, with the object whose body
    /// contains them.
    pub fn diagnostics(&self) -> Vec<(ObjectId, &UnresolvedCall)> {
        self.dependency_graph()
            .flat_map(|(id, deps)| deps.unresolved.iter().map(move |call| (id, call)))
            .collect()
    }

    /// Routines in `schema` called `name` whose input arity is `arity`.
    pub fn overloads(&self, schema: &str, name: &str, arity: usize) -> Vec<ObjectId> {
        self.named(schema, name)
            .iter()
            .copied()
            .filter(|id| {
                let object = self.object(*id);
                matches!(
                    object.kind(),
                    ObjectKind::Function | ObjectKind::Procedure | ObjectKind::Aggregate
                ) && object.arity() == Some(arity)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Options;
    use serde_json::json;

    fn load(objects: serde_json::Value) -> Database {
        Database::from_value(json!({ "version": "1", "objects": objects }), Options::default())
            .unwrap()
    }

    fn deps_of(db: &Database, kind: ObjectKind, schema: &str, name: &str) -> Vec<String> {
        let id = db.find(kind, schema, name).unwrap();
        db.dependencies(id)
            .objects()
            .map(|dep| db.object(dep).ident())
            .collect()
    }

    #[test]
    fn table_depends_on_schema_types_and_references() {
        let db = load(json!([
            { "enum_type": { "schema": "shop", "name": "state", "labels": ["new"] } },
            { "table": { "schema": "shop", "name": "order", "columns": [
                { "name": "id", "data_type": "integer" },
                { "name": "state", "data_type": "shop.state" }
            ] } },
            { "table": { "schema": "shop", "name": "line", "columns": [
                { "name": "order_id", "data_type": "integer" }
            ], "foreign_keys": [{
                "columns": ["order_id"],
                "references": { "table": { "schema": "shop", "name": "order" }, "columns": ["id"] }
            }] } }
        ]));
        assert_eq!(deps_of(&db, ObjectKind::Table, "shop", "order"), ["shop", "shop.state"]);
        assert_eq!(deps_of(&db, ObjectKind::Table, "shop", "line"), ["shop", "shop.order"]);
    }

    #[test]
    fn array_element_type_is_a_dependency() {
        let db = load(json!([
            { "enum_type": { "schema": "shop", "name": "state", "labels": ["new"] } },
            { "table": { "schema": "shop", "name": "history", "columns": [
                { "name": "states", "data_type": "shop.state[]" }
            ] } }
        ]));
        assert_eq!(deps_of(&db, ObjectKind::Table, "shop", "history"), ["shop", "shop.state"]);
    }

    #[test]
    fn function_body_calls_match_by_arity() {
        let db = load(json!([
            { "function": { "schema": "util", "name": "f", "return_type": "integer",
                "arguments": [{ "data_type": "integer" }], "source": "select 1" } },
            { "function": { "schema": "util", "name": "f", "return_type": "integer",
                "arguments": [{ "data_type": "integer" }, { "data_type": "integer" }],
                "source": "select 2" } },
            { "view": { "schema": "util", "name": "v", "query": "select util.f(1, 2), util.f(1, 2, 3)" } }
        ]));
        let view = db.find(ObjectKind::View, "util", "v").unwrap();
        let deps = db.dependencies(view);

        let two_args = db.overloads("util", "f", 2);
        assert_eq!(two_args.len(), 1);
        assert!(deps.contains(two_args[0]));
        assert!(!deps.contains(db.overloads("util", "f", 1)[0]));

        assert_eq!(
            deps.unresolved(),
            [UnresolvedCall {
                name: QualifiedName::new("util", "f"),
                arity: 3
            }]
        );
        let diagnostics = db.diagnostics();
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].0, view);
        assert_eq!(
            diagnostics[0].1.to_string(),
            "no overload of util.f takes 3 arguments"
        );
    }

    #[test]
    fn calls_to_undeclared_routines_are_not_diagnosed() {
        let db = load(json!([
            { "view": { "schema": "util", "name": "v", "query": "select pg_catalog.now()" } }
        ]));
        assert!(db.diagnostics().is_empty());
    }

    #[test]
    fn view_names_every_same_named_object() {
        let db = load(json!([
            { "table": { "schema": "shop", "name": "order", "columns": [] } },
            { "view": { "schema": "shop", "name": "open_order",
                "query": "select * from shop.order where not shop.is_closed(order.id)" } },
            { "function": { "schema": "shop", "name": "is_closed", "return_type": "boolean",
                "arguments": [{ "data_type": "integer" }], "source": "select false" } }
        ]));
        assert_eq!(
            deps_of(&db, ObjectKind::View, "shop", "open_order"),
            ["shop", "shop.order", "shop.is_closed"]
        );
    }

    fn deps_of_kind(db: &Database, kind: ObjectKind) -> Vec<String> {
        let (id, _) = db.iter().find(|(_, o)| o.kind() == kind).unwrap();
        db.dependencies(id)
            .objects()
            .map(|dep| db.object(dep).ident())
            .collect()
    }

    #[test]
    fn cast_depends_on_types_and_function() {
        let db = load(json!([
            { "cast": { "source": "text", "target": "shop.money", "function": "shop.to_money" } },
            { "function": { "schema": "shop", "name": "to_money", "return_type": "shop.money",
                "arguments": [{ "data_type": "text" }], "source": "select null" } },
            { "composite_type": { "schema": "shop", "name": "money", "columns": [
                { "name": "amount", "data_type": "numeric" }
            ] } }
        ]));
        assert_eq!(deps_of_kind(&db, ObjectKind::Cast), ["shop.money", "shop.to_money"]);
    }

    #[test]
    fn cast_with_builtin_function_has_no_schema() {
        let db = load(json!([
            { "composite_type": { "schema": "shop", "name": "money", "columns": [] } },
            { "cast": { "source": "shop.money", "target": "text", "function": "pg_catalog.textin" } }
        ]));
        let (_, cast) = db.iter().find(|(_, o)| o.kind() == ObjectKind::Cast).unwrap();
        assert_eq!(cast.schema(), None);
        assert_eq!(cast.ident(), "shop.money as public.text");
        assert!(db.schema("pg_catalog").is_none());
        assert_eq!(deps_of_kind(&db, ObjectKind::Cast), ["shop.money"]);
    }

    #[test]
    fn aggregate_depends_on_its_functions() {
        let db = load(json!([
            { "aggregate": { "schema": "util", "name": "total",
                "arguments": [{ "data_type": "integer" }],
                "sfunc": "util.add", "stype": "integer", "final_func": "util.finish" } },
            { "function": { "schema": "util", "name": "add", "return_type": "integer",
                "arguments": [{ "data_type": "integer" }, { "data_type": "integer" }],
                "source": "select $1 + $2" } },
            { "function": { "schema": "util", "name": "finish", "return_type": "integer",
                "arguments": [{ "data_type": "integer" }], "source": "select $1" } }
        ]));
        assert_eq!(
            deps_of(&db, ObjectKind::Aggregate, "util", "total"),
            ["util", "util.add", "util.finish"]
        );
    }

    #[test]
    fn aggregate_state_type_is_a_dependency() {
        let db = load(json!([
            { "composite_type": { "schema": "util", "name": "state", "columns": [] } },
            { "function": { "schema": "util", "name": "step", "return_type": "util.state",
                "arguments": [{ "data_type": "util.state" }, { "data_type": "integer" }],
                "source": "select $1" } },
            { "aggregate": { "schema": "util", "name": "collect",
                "arguments": [{ "data_type": "integer" }],
                "sfunc": "util.step", "stype": "util.state" } }
        ]));
        assert_eq!(
            deps_of(&db, ObjectKind::Aggregate, "util", "collect"),
            ["util", "util.state", "util.step"]
        );
    }

    #[test]
    fn procedure_body_is_scanned() {
        let db = load(json!([
            { "procedure": { "schema": "util", "name": "refresh", "language": "plpgsql",
                "source": "begin insert into shop.log values (shop.stamp()); end" } },
            { "table": { "schema": "shop", "name": "log", "columns": [
                { "name": "at", "data_type": "timestamp" }
            ] } },
            { "function": { "schema": "shop", "name": "stamp", "return_type": "timestamp",
                "source": "select now()" } }
        ]));
        assert_eq!(
            deps_of(&db, ObjectKind::Procedure, "util", "refresh"),
            ["util", "shop.log", "shop.stamp"]
        );
    }

    #[test]
    fn row_depends_on_its_table() {
        let db = load(json!([
            { "row": { "table": { "schema": "shop", "name": "state" },
                "values": { "id": 1, "label": "new" } } },
            { "table": { "schema": "shop", "name": "state", "columns": [
                { "name": "id", "data_type": "integer" },
                { "name": "label", "data_type": "text" }
            ] } }
        ]));
        assert_eq!(deps_of_kind(&db, ObjectKind::Row), ["shop", "shop.state"]);
    }

    #[test]
    fn operator_depends_on_operands_and_function() {
        let db = load(json!([
            { "operator": { "schema": "shop", "name": "===",
                "left_arg": "shop.money", "right_arg": "shop.money", "function": "shop.money_eq" } },
            { "function": { "schema": "shop", "name": "money_eq", "return_type": "boolean",
                "arguments": [{ "data_type": "shop.money" }, { "data_type": "shop.money" }],
                "source": "select true" } },
            { "composite_type": { "schema": "shop", "name": "money", "columns": [] } }
        ]));
        assert_eq!(
            deps_of(&db, ObjectKind::Operator, "shop", "==="),
            ["shop", "shop.money", "shop.money_eq"]
        );
    }

    #[test]
    fn role_membership_cycles_are_plain_edges() {
        let db = load(json!([
            { "role": { "name": "a", "member_of": ["b"] } },
            { "role": { "name": "b", "member_of": ["a"] } }
        ]));
        let a = db.role("a").unwrap();
        let b = db.role("b").unwrap();
        assert!(db.dependencies(a).contains(b));
        assert!(db.dependencies(b).contains(a));
    }
}
