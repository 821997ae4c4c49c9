//! Creation order over whole documents.

use std::collections::HashMap;

use pgschema::{Database, ObjectId, Options};
use proptest::prelude::*;
use serde_json::{Value, json};

fn load(objects: Value) -> Database {
    Database::from_value(json!({ "objects": objects }), Options::default()).unwrap()
}

fn idents(db: &Database, ids: &[ObjectId]) -> Vec<String> {
    ids.iter().map(|id| db.object(*id).ident()).collect()
}

#[test]
fn referenced_table_comes_first() {
    // order_line is loaded before the table it points at.
    let db = load(json!([
        { "table": {
            "schema": "shop", "name": "order_line",
            "columns": [
                { "name": "id", "data_type": "integer", "nullable": false },
                { "name": "order_id", "data_type": "integer", "nullable": false }
            ],
            "primary_key": ["id"],
            "foreign_keys": [{
                "columns": ["order_id"],
                "references": { "table": { "schema": "shop", "name": "order" }, "columns": ["id"] }
            }]
        } },
        { "table": {
            "schema": "shop", "name": "order",
            "columns": [{ "name": "id", "data_type": "integer", "nullable": false }],
            "primary_key": ["id"]
        } }
    ]));

    let ordering = db.order();
    assert!(ordering.is_clean());
    assert_eq!(
        idents(&db, &ordering.objects),
        ["shop", "shop.order", "shop.order_line"]
    );
}

#[test]
fn document_in_creation_order() {
    let db = load(json!([
        { "view": { "schema": "shop", "name": "open_orders", "query": "select * from shop.order" } },
        { "table": { "schema": "shop", "name": "order", "columns": [] } }
    ]));

    let document = db.document_of(db.order().objects).to_value();
    // The implicit schema is not written.
    assert_eq!(
        document["objects"],
        json!([
            { "table": { "schema": "shop", "name": "order", "columns": [] } },
            { "view": { "schema": "shop", "name": "open_orders", "query": "select * from shop.order" } }
        ])
    );
}

#[test]
fn column_types_come_before_tables() {
    let db = load(json!([
        { "table": {
            "schema": "shop", "name": "order",
            "columns": [{ "name": "state", "data_type": "shop.order_state" }]
        } },
        { "enum_type": { "schema": "shop", "name": "order_state", "labels": ["new", "paid"] } }
    ]));

    assert_eq!(
        idents(&db, &db.order().objects),
        ["shop", "shop.order_state", "shop.order"]
    );
}

#[test]
fn view_waits_for_the_function_it_calls() {
    let db = load(json!([
        { "view": { "schema": "report", "name": "totals", "query": "select util.total(1, 2)" } },
        { "function": {
            "schema": "util", "name": "total", "return_type": "integer",
            "arguments": [{ "name": "a", "data_type": "integer" }, { "name": "b", "data_type": "integer" }],
            "source": "select a + b"
        } }
    ]));

    assert_eq!(
        idents(&db, &db.order().objects),
        ["report", "util", "util.total", "report.totals"]
    );
}

#[test]
fn trigger_follows_table_and_function() {
    let db = load(json!([
        { "trigger": {
            "name": "touch_order", "table": { "schema": "shop", "name": "order" },
            "function": "shop.touch", "when": "before", "events": ["update"]
        } },
        { "function": { "schema": "shop", "name": "touch", "return_type": "trigger", "language": "plpgsql",
            "source": "begin new.updated = now(); return new; end" } },
        { "table": { "schema": "shop", "name": "order",
            "columns": [{ "name": "updated", "data_type": "timestamp" }] } }
    ]));

    let order = idents(&db, &db.order().objects);
    let position = |ident: &str| order.iter().position(|i| i == ident).unwrap();
    assert!(position("shop.touch") < position("shop.touch_order"));
    assert!(position("shop.order") < position("shop.touch_order"));
}

#[test]
fn casts_rows_and_operators_follow_what_they_use() {
    let db = load(json!([
        { "row": { "table": { "schema": "shop", "name": "state" }, "values": { "id": 1 } } },
        { "operator": { "schema": "shop", "name": "===",
            "left_arg": "shop.money", "right_arg": "shop.money", "function": "shop.money_eq" } },
        { "cast": { "source": "text", "target": "shop.money", "function": "shop.to_money" } },
        { "aggregate": { "schema": "shop", "name": "total", "arguments": [{ "data_type": "integer" }],
            "sfunc": "shop.add", "stype": "integer" } },
        { "function": { "schema": "shop", "name": "money_eq", "return_type": "boolean",
            "arguments": [{ "data_type": "shop.money" }, { "data_type": "shop.money" }],
            "source": "select true" } },
        { "function": { "schema": "shop", "name": "to_money", "return_type": "shop.money",
            "arguments": [{ "data_type": "text" }], "source": "select null" } },
        { "function": { "schema": "shop", "name": "add", "return_type": "integer",
            "arguments": [{ "data_type": "integer" }, { "data_type": "integer" }],
            "source": "select $1 + $2" } },
        { "composite_type": { "schema": "shop", "name": "money",
            "columns": [{ "name": "amount", "data_type": "numeric" }] } },
        { "table": { "schema": "shop", "name": "state",
            "columns": [{ "name": "id", "data_type": "integer" }] } }
    ]));

    let ordering = db.order();
    assert!(ordering.is_clean());
    assert_eq!(ordering.objects.len(), db.objects().len());

    let order = idents(&db, &ordering.objects);
    let position = |ident: &str| order.iter().position(|i| i == ident).unwrap();
    assert!(position("shop.state") < position("shop.row"));
    assert!(position("shop.money") < position("shop.money_eq"));
    assert!(position("shop.money_eq") < position("shop.==="));
    assert!(position("shop.to_money") < position("public.text as shop.money"));
    assert!(position("shop.add") < position("shop.total"));
}

#[test]
fn cast_implemented_by_builtin_function_is_kept() {
    let cast = json!({ "cast": {
        "source": "shop.money", "target": "text", "function": "pg_catalog.textin"
    } });
    let db = load(json!([
        { "composite_type": { "schema": "shop", "name": "money",
            "columns": [{ "name": "amount", "data_type": "numeric" }] } },
        cast.clone()
    ]));

    assert!(db.schema("pg_catalog").is_none());
    assert_eq!(
        idents(&db, &db.order().objects),
        ["shop", "shop.money", "shop.money as public.text"]
    );

    let document = db.document_of(db.order().objects).to_value();
    let objects = document["objects"].as_array().unwrap();
    assert_eq!(objects.len(), 2);
    assert_eq!(objects[1], cast);
}

#[test]
fn order_is_deterministic() {
    let objects = json!([
        { "view": { "schema": "r", "name": "a", "query": "select * from r.b" } },
        { "view": { "schema": "r", "name": "b", "query": "select * from r.a" } },
        { "table": { "schema": "s", "name": "t", "columns": [] } }
    ]);
    let first = load(objects.clone());
    let second = load(objects);
    assert_eq!(first.order(), second.order());
    assert_eq!(first.order(), first.order());
}

/// Tables `t0..tn` where table `i` references a subset of the tables before
/// it, and the order in which the tables are loaded.
fn foreign_key_dag() -> impl Strategy<Value = (Vec<Vec<usize>>, Vec<usize>)> {
    (1usize..8).prop_flat_map(|n| {
        let edges: Vec<_> = (0..n)
            .map(|i| proptest::sample::subsequence((0..i).collect::<Vec<_>>(), 0..=i))
            .collect();
        (edges, Just((0..n).collect::<Vec<_>>()).prop_shuffle())
    })
}

fn dag_document(edges: &[Vec<usize>], load_order: &[usize]) -> Value {
    let tables: Vec<Value> = load_order
        .iter()
        .map(|&i| {
            let mut columns = vec![json!({ "name": "id", "data_type": "integer", "nullable": false })];
            let mut foreign_keys = Vec::new();
            for &j in &edges[i] {
                columns.push(json!({ "name": format!("t{j}_id"), "data_type": "integer" }));
                foreign_keys.push(json!({
                    "columns": [format!("t{j}_id")],
                    "references": { "table": { "schema": "g", "name": format!("t{j}") }, "columns": ["id"] }
                }));
            }
            json!({ "table": {
                "schema": "g", "name": format!("t{i}"),
                "columns": columns, "primary_key": ["id"], "foreign_keys": foreign_keys
            } })
        })
        .collect();
    Value::Array(tables)
}

proptest! {
    #[test]
    fn acyclic_documents_order_cleanly((edges, load_order) in foreign_key_dag()) {
        let db = load(dag_document(&edges, &load_order));
        let ordering = db.order();

        prop_assert!(ordering.is_clean());
        prop_assert_eq!(ordering.objects.len(), edges.len() + 1);

        let order = idents(&db, &ordering.objects);
        let positions: HashMap<&str, usize> = order
            .iter()
            .enumerate()
            .map(|(position, ident)| (ident.as_str(), position))
            .collect();
        prop_assert_eq!(positions.len(), order.len());
        prop_assert_eq!(positions["g"], 0);

        for (i, referenced) in edges.iter().enumerate() {
            let table = format!("g.t{i}");
            let table = positions[table.as_str()];
            for j in referenced {
                let dependency = format!("g.t{j}");
                let dependency = positions[dependency.as_str()];
                prop_assert!(dependency < table);
            }
        }

        prop_assert_eq!(db.order(), ordering);
    }
}
