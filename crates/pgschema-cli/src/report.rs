//! Terminal rendering of plans, orderings and problems.

use std::fmt::Write;

use owo_colors::OwoColorize;
use pgschema::{Database, MigrationPlan, ObjectId, Operation, Ordering, SchemaObject};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Change {
    Added,
    Removed,
    Modified,
}

fn change(operation: &Operation) -> Change {
    match operation {
        Operation::CreateSchema(_)
        | Operation::CreateTable(_)
        | Operation::AddColumn { .. }
        | Operation::CreateFunction(_)
        | Operation::CreateView(_)
        | Operation::CreateType(_)
        | Operation::CreateTrigger(_)
        | Operation::CreateOperator(_) => Change::Added,
        Operation::DropSchema(_)
        | Operation::DropTable(_)
        | Operation::DropColumn { .. }
        | Operation::DropFunction(_)
        | Operation::DropView(_)
        | Operation::DropType(_)
        | Operation::DropTrigger(_)
        | Operation::DropOperator(_) => Change::Removed,
        Operation::AlterColumnType { .. }
        | Operation::AlterColumnNullable { .. }
        | Operation::ReplaceFunction(_) => Change::Modified,
    }
}

/// One line per operation, colored by what it does.
pub fn plan(plan: &MigrationPlan, color: bool) -> String {
    if plan.is_empty() || !color {
        return plan.to_string();
    }

    let mut out = String::new();
    for (operation, line) in plan.operations.iter().zip(plan.lines()) {
        let line = line.to_string();
        let _ = match change(operation) {
            Change::Added => writeln!(out, "{}", line.green()),
            Change::Removed => writeln!(out, "{}", line.red()),
            Change::Modified => writeln!(out, "{}", line.yellow()),
        };
    }
    out
}

/// Objects in creation order, one per line, with forced placements marked.
pub fn ordering(db: &Database, ordering: &Ordering, color: bool) -> String {
    let mut out = String::new();
    for id in &ordering.objects {
        let object = db.object(*id);
        let line = format!("{:<14} {}", object.kind().as_str(), object.ident());
        let _ = if !ordering.forced.contains(id) {
            writeln!(out, "{line}")
        } else if color {
            writeln!(out, "{}  {}", line, "(cycle)".yellow())
        } else {
            writeln!(out, "{line}  (cycle)")
        };
    }
    out
}

/// The dependencies of one object, indented under its identifier.
pub fn dependencies(db: &Database, id: ObjectId, color: bool) -> String {
    let object = db.object(id);
    let deps = db.dependencies(id);
    let mut out = String::new();

    let _ = if color {
        writeln!(out, "{} {}", object.kind().as_str().dimmed(), object.ident().bold())
    } else {
        writeln!(out, "{} {}", object.kind().as_str(), object.ident())
    };
    for dep in deps.objects() {
        let dep = db.object(dep);
        let _ = writeln!(out, "  -> {} {}", dep.kind().as_str(), dep.ident());
    }
    for call in deps.unresolved() {
        let _ = if color {
            writeln!(out, "  {} {}", "?".yellow(), call)
        } else {
            writeln!(out, "  ? {call}")
        };
    }
    out
}

/// A single problem about `subject`.
pub fn problem(subject: &str, message: &dyn std::fmt::Display, color: bool) -> String {
    if color {
        format!("{} {}: {}", "warning:".yellow().bold(), subject.bold(), message)
    } else {
        format!("warning: {subject}: {message}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pgschema::Options;
    use serde_json::json;

    fn load(objects: serde_json::Value) -> Database {
        Database::from_value(json!({ "objects": objects }), Options::default()).unwrap()
    }

    #[test]
    fn plain_plan_matches_display() {
        let current = load(json!([]));
        let target = load(json!([{ "table": { "schema": "shop", "name": "order", "columns": [] } }]));
        let plan = current.diff(&target);
        assert_eq!(super::plan(&plan, false), "+ schema shop\n+ table shop.order\n");
    }

    #[test]
    fn colored_plan_keeps_text() {
        let current = load(json!([{ "table": { "schema": "shop", "name": "order", "columns": [] } }]));
        let target = load(json!([]));
        let plan = current.diff(&target);
        let colored = super::plan(&plan, true);
        assert!(colored.contains("- table shop.order"));
        assert!(colored.contains('\u{1b}'));
    }

    #[test]
    fn forced_objects_are_marked() {
        let db = load(json!([
            { "view": { "schema": "r", "name": "a", "query": "select * from r.b" } },
            { "view": { "schema": "r", "name": "b", "query": "select * from r.a" } }
        ]));
        let text = ordering(&db, &db.order(), false);
        assert_eq!(
            text,
            "schema         r\nview           r.a  (cycle)\nview           r.b\n"
        );
    }

    #[test]
    fn unresolved_calls_are_listed() {
        let db = load(json!([
            { "function": { "schema": "util", "name": "f", "return_type": "integer",
                "arguments": [{ "data_type": "integer" }], "source": "select 1" } },
            { "view": { "schema": "r", "name": "v", "query": "select util.f(1, 2)" } }
        ]));
        let view = db
            .iter()
            .find(|(_, o)| o.name() == "v")
            .map(|(id, _)| id)
            .unwrap();
        assert_eq!(
            dependencies(&db, view, false),
            "view r.v\n  -> schema r\n  ? no overload of util.f takes 2 arguments\n"
        );
    }
}
