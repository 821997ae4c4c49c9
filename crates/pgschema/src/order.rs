//! Creation order.
//!
//! Objects are placed greedily: on every step the first remaining object,
//! in load order, none of whose dependencies is still unplaced goes next.
//! Cycles are broken in two stages:
//!
//! 1. When nothing is free, dependencies on objects sharing the candidate's
//!    own name stop counting. Overloads and recursive functions calling each
//!    other get through this way.
//! 2. When still nothing is free, the first remaining object is placed
//!    anyway. The resulting order may be invalid; the object is reported in
//!    [`Ordering::forced`].
//!
//! ```text
//! remaining: [view a -> b, view b -> a, table t]
//! step 1: t is free                  -> [t]
//! step 2: a, b block each other      -> relax: names differ, still blocked
//!                                    -> force a
//! step 3: b is free                  -> [t, a, b]
//! ```

use std::collections::{HashMap, HashSet};

use tracing::{debug, warn};

use crate::model::{Identity, Object, SchemaObject};
use crate::refs::ObjectId;
use crate::Database;

/// The result of ordering a set of objects.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Ordering {
    /// Every ordered object exactly once, dependencies first.
    pub objects: Vec<ObjectId>,
    /// Objects placed only after ignoring same-named dependencies.
    pub relaxed: Vec<ObjectId>,
    /// Objects placed while one of their dependencies was still pending.
    pub forced: Vec<ObjectId>,
}

impl Ordering {
    /// True when no dependency had to be ignored.
    pub fn is_clean(&self) -> bool {
        self.relaxed.is_empty() && self.forced.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Blocking {
    /// Every pending dependency blocks.
    Strict,
    /// Only pending dependencies with a different name block.
    OtherNames,
}

impl Database {
    /// Whether `id` still waits on something in `pending`. An object never
    /// blocks itself.
    fn is_blocked(&self, id: ObjectId, pending: &HashSet<ObjectId>, blocking: Blocking) -> bool {
        let name = self.object(id).name();
        self.dependencies(id).objects().any(|dep| {
            dep != id
                && pending.contains(&dep)
                && (blocking == Blocking::Strict || self.object(dep).name() != name)
        })
    }

    /// Order every object outside the excluded schemas.
    pub fn order(&self) -> Ordering {
        let included = self
            .iter()
            .filter(|(_, object)| {
                object
                    .schema()
                    .is_none_or(|schema| !self.options.is_excluded(schema))
            })
            .map(|(id, _)| id);
        self.order_subset(included)
    }

    /// The objects of [`Database::order`], dependencies first.
    pub fn ordered_objects(&self) -> Vec<&Object> {
        self.order()
            .objects
            .into_iter()
            .map(|id| self.object(id))
            .collect()
    }

    /// Order the given objects. Ties are broken by the order of `ids`, and
    /// dependencies outside `ids` are ignored.
    pub fn order_subset(&self, ids: impl IntoIterator<Item = ObjectId>) -> Ordering {
        let mut remaining: Vec<ObjectId> = Vec::new();
        let mut pending: HashSet<ObjectId> = HashSet::new();
        for id in ids {
            if pending.insert(id) {
                remaining.push(id);
            }
        }

        let mut ordering = Ordering {
            objects: Vec::with_capacity(remaining.len()),
            ..Ordering::default()
        };

        while !remaining.is_empty() {
            let position = if let Some(position) = remaining
                .iter()
                .position(|id| !self.is_blocked(*id, &pending, Blocking::Strict))
            {
                position
            } else if let Some(position) = remaining
                .iter()
                .position(|id| !self.is_blocked(*id, &pending, Blocking::OtherNames))
            {
                debug!(object = %self.object(remaining[position]).ident(), "placed ignoring same-named dependencies");
                ordering.relaxed.push(remaining[position]);
                position
            } else {
                warn!(
                    object = %self.object(remaining[0]).ident(),
                    pending = remaining.len(),
                    "dependency cycle, placing object before its dependencies"
                );
                ordering.forced.push(remaining[0]);
                0
            };

            let id = remaining.remove(position);
            pending.remove(&id);
            ordering.objects.push(id);
        }

        ordering
    }

    /// This database's objects in the order `reference` lists the same
    /// objects, followed by the ones `reference` lacks in load order.
    ///
    /// Objects are matched by [`Identity`].
    pub fn merge_order(&self, reference: &Database) -> Vec<ObjectId> {
        let mut positions: HashMap<Identity, usize> = HashMap::new();
        for (position, object) in reference.objects.iter().enumerate() {
            positions.entry(object.identity()).or_insert(position);
        }

        let (mut known, unknown): (Vec<_>, Vec<_>) = self
            .iter()
            .map(|(id, object)| (id, positions.get(&object.identity()).copied()))
            .partition(|(_, position)| position.is_some());
        known.sort_by_key(|(id, position)| (*position, *id));

        known
            .into_iter()
            .chain(unknown)
            .map(|(id, _)| id)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ObjectKind, Options};
    use serde_json::json;

    fn load(objects: serde_json::Value) -> Database {
        Database::from_value(json!({ "objects": objects }), Options::default()).unwrap()
    }

    fn idents(db: &Database, ids: &[ObjectId]) -> Vec<String> {
        ids.iter().map(|id| db.object(*id).ident()).collect()
    }

    #[test]
    fn schema_comes_before_contents() {
        let db = load(json!([
            { "view": { "schema": "report", "name": "v", "query": "select 1" } }
        ]));
        let ordering = db.order();
        assert_eq!(idents(&db, &ordering.objects), ["report", "report.v"]);
        assert!(ordering.is_clean());
    }

    #[test]
    fn excluded_schemas_are_left_out() {
        let db = load(json!([
            { "view": { "schema": "information_schema", "name": "tables", "query": "select 1" } },
            { "view": { "schema": "report", "name": "v", "query": "select * from information_schema.tables" } }
        ]));
        assert_eq!(idents(&db, &db.order().objects), ["report", "report.v"]);
    }

    #[test]
    fn same_named_cycle_is_relaxed() {
        // Two overloads of util.walk calling each other.
        let db = load(json!([
            { "function": { "schema": "util", "name": "walk", "return_type": "integer",
                "arguments": [{ "data_type": "integer" }],
                "source": "select util.walk(1, 2)" } },
            { "function": { "schema": "util", "name": "walk", "return_type": "integer",
                "arguments": [{ "data_type": "integer" }, { "data_type": "integer" }],
                "source": "select util.walk(1)" } }
        ]));
        let ordering = db.order();
        assert_eq!(ordering.objects.len(), 3);
        assert_eq!(ordering.relaxed.len(), 1);
        assert!(ordering.forced.is_empty());
    }

    #[test]
    fn genuine_cycle_is_forced_in_load_order() {
        let db = load(json!([
            { "view": { "schema": "r", "name": "a", "query": "select * from r.b" } },
            { "view": { "schema": "r", "name": "b", "query": "select * from r.a" } },
            { "table": { "schema": "r", "name": "t", "columns": [] } }
        ]));
        let ordering = db.order();
        assert_eq!(idents(&db, &ordering.objects), ["r", "r.t", "r.a", "r.b"]);
        assert_eq!(idents(&db, &ordering.forced), ["r.a"]);
    }

    #[test]
    fn self_reference_does_not_block() {
        let db = load(json!([
            { "table": { "schema": "org", "name": "employee",
                "columns": [{ "name": "id", "data_type": "integer" }, { "name": "boss", "data_type": "integer" }],
                "foreign_keys": [{ "columns": ["boss"],
                    "references": { "table": { "schema": "org", "name": "employee" }, "columns": ["id"] } }] } }
        ]));
        let ordering = db.order();
        assert!(ordering.is_clean());
        assert_eq!(idents(&db, &ordering.objects), ["org", "org.employee"]);
    }

    #[test]
    fn merge_follows_reference_order() {
        let ours = load(json!([
            { "table": { "schema": "s", "name": "a", "columns": [] } },
            { "table": { "schema": "s", "name": "b", "columns": [] } },
            { "table": { "schema": "s", "name": "new", "columns": [] } }
        ]));
        let reference = load(json!([
            { "table": { "schema": "s", "name": "b", "columns": [] } },
            { "table": { "schema": "s", "name": "a", "columns": [] } }
        ]));
        let merged = ours.merge_order(&reference);
        assert_eq!(idents(&ours, &merged), ["s", "s.b", "s.a", "s.new"]);
        assert_eq!(ours.object(merged[3]).kind(), ObjectKind::Table);
    }
}
