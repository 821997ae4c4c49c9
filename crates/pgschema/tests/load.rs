//! Loading documents and writing them back.

use pgschema::document::{Document, DocumentOrder};
use pgschema::{Database, Error, Object, ObjectKind, Options, SchemaObject, TypeRef, TypeTarget};
use serde_json::{Value, json};

fn load(value: Value) -> Database {
    Database::from_value(value, Options::default()).unwrap()
}

fn shop() -> Value {
    json!({
        "version": "1",
        "extensions": ["btree_gist"],
        "objects": [
            { "table": {
                "name": "Order",
                "schema": "shop",
                "description": "Contains all orders",
                "columns": [
                    { "name": "id", "data_type": "integer", "nullable": false, "description": "Primary key" },
                    { "name": "created", "data_type": "timestamp with time zone", "nullable": true }
                ],
                "primary_key": ["id"]
            } },
            { "table": {
                "name": "OrderLine",
                "schema": "shop",
                "columns": [
                    { "name": "id", "data_type": "integer", "nullable": false },
                    { "name": "order_id", "data_type": "integer", "nullable": false }
                ],
                "primary_key": { "name": "order_line_pkey", "columns": ["id"] },
                "foreign_keys": [{
                    "columns": ["order_id"],
                    "references": {
                        "table": { "name": "Order", "schema": "shop" },
                        "columns": ["id"]
                    },
                    "on_update": "none",
                    "on_delete": "cascade"
                }]
            } }
        ]
    })
}

#[test]
fn load_shop() {
    let db = load(shop());

    assert_eq!(db.schemas().count(), 1);
    assert!(db.schema("shop").is_some());
    assert_eq!(db.extensions(), ["btree_gist"]);

    let line = db.find(ObjectKind::Table, "shop", "OrderLine").unwrap();
    let Object::Table(table) = db.object(line) else {
        panic!("expected a table");
    };
    assert_eq!(table.columns.len(), 2);
    assert_eq!(
        table.foreign_keys[0].references.target(),
        db.find(ObjectKind::Table, "shop", "Order")
    );
}

#[test]
fn tables_round_trip() {
    let input = shop();
    let db = load(input.clone());
    let output = db.to_document(DocumentOrder::Internal).to_value();

    assert_eq!(output["objects"], input["objects"]);
    assert_eq!(output["extensions"], input["extensions"]);
    assert_eq!(output["version"], "1");
}

#[test]
fn document_deserializes_back() {
    let db = load(shop());
    let document = db.to_document(DocumentOrder::BySchema);
    let reparsed: Document = serde_json::from_value(document.to_value()).unwrap();
    assert_eq!(reparsed, document);

    let again = Database::from_value(document.to_value(), Options::default()).unwrap();
    assert_eq!(again.objects(), db.objects());
}

#[test]
fn enum_labels_keep_their_order() {
    let db = load(json!({
        "objects": [{ "enum_type": {
            "schema": "shop",
            "name": "order_state",
            "labels": ["new", "shipped", "cancelled"]
        } }]
    }));

    let document = db.to_document(DocumentOrder::Internal).to_value();
    assert_eq!(
        document["objects"][0]["enum_type"]["labels"],
        json!(["new", "shipped", "cancelled"])
    );
}

#[test]
fn inherits_from_table_declared_later() {
    let db = load(json!({
        "objects": [
            { "table": {
                "schema": "shop", "name": "special_order",
                "columns": [{ "name": "reason", "data_type": "text" }],
                "inherits": { "schema": "shop", "name": "order" }
            } },
            { "table": {
                "schema": "shop", "name": "order",
                "columns": [{ "name": "id", "data_type": "integer" }]
            } }
        ]
    }));

    let child = db.find(ObjectKind::Table, "shop", "special_order").unwrap();
    let parent = db.find(ObjectKind::Table, "shop", "order").unwrap();
    let Object::Table(table) = db.object(child) else {
        panic!("expected a table");
    };
    let inherited = table.inherits.as_ref().unwrap().target().unwrap();
    assert_eq!(inherited, parent);
    assert_eq!(db.object(inherited).name(), "order");
}

#[test]
fn missing_inheritance_parent_is_an_error() {
    let err = Database::from_value(
        json!({
            "objects": [{ "table": {
                "schema": "shop", "name": "special_order", "columns": [],
                "inherits": { "schema": "shop", "name": "order" }
            } }]
        }),
        Options::default(),
    )
    .unwrap_err();
    assert_eq!(err.to_string(), "table not defined in schema shop: order");
}

#[test]
fn type_resolution_is_idempotent() {
    let db = load(json!({
        "objects": [
            { "composite_type": {
                "schema": "shop", "name": "money",
                "columns": [{ "name": "amount", "data_type": "numeric" }, { "name": "currency", "data_type": "text" }]
            } },
            { "table": { "schema": "shop", "name": "money", "columns": [] } }
        ]
    }));

    let money = TypeRef::parse("shop.money", "public");
    let first = db.resolve_type(&money).unwrap();
    let second = db.resolve_type(&money).unwrap();
    assert_eq!(first, second);

    // The composite type wins over the table of the same name.
    let TypeTarget::Object(id) = first else {
        panic!("expected a declared type");
    };
    assert_eq!(db.object(id).kind(), ObjectKind::CompositeType);
}

#[test]
fn custom_default_schema() {
    let options = Options {
        default_schema: "app".to_string(),
        silent_schemas: vec!["pg_catalog".to_string()],
        ..Options::default()
    };
    let db = Database::from_value(
        json!({
            "objects": [{ "table": { "name": "user", "columns": [{ "name": "id", "data_type": "integer" }] } }]
        }),
        options,
    )
    .unwrap();
    assert!(db.find(ObjectKind::Table, "app", "user").is_some());
}

#[test]
fn malformed_entry_names_its_kind() {
    let err = Database::from_value(
        json!({ "objects": [{ "enum_type": { "name": "state" } }] }),
        Options::default(),
    )
    .unwrap_err();
    assert!(
        matches!(&err, Error::MalformedObject { kind, .. } if kind == "enum_type"),
        "unexpected error: {err}"
    );
}

#[test]
fn by_schema_groups_kinds() {
    let db = load(json!({
        "objects": [
            { "view": { "schema": "b", "name": "v", "query": "select 1" } },
            { "table": { "schema": "a", "name": "t", "columns": [] } },
            { "setting": { "name": "search_path", "value": "a, b" } },
            { "schema": { "name": "a", "description": "first" } },
            { "sequence": { "schema": "a", "name": "seq" } }
        ]
    }));

    let document = db.to_document(DocumentOrder::BySchema).to_value();
    let kinds: Vec<String> = document["objects"]
        .as_array()
        .unwrap()
        .iter()
        .map(|entry| entry.as_object().unwrap().keys().next().unwrap().clone())
        .collect();
    assert_eq!(kinds, ["view", "schema", "sequence", "table", "setting"]);
}
