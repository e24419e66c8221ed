// SPDX-FileCopyrightText: 2026 Bruno Meilick
// SPDX-License-Identifier: LicenseRef-Proteus-FreeUse-NoCopy-NoDerivatives
//
// All rights reserved.
//
// This file is part of Proteus and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

use rstest::rstest;

use super::{relation_name_for, DiagramStore, StoreError};
use crate::model::{DiagramId, ElementId, ElementPatch, ElementRecord, FieldDescriptor};

fn store() -> DiagramStore {
    DiagramStore::open_in_memory().expect("in-memory store")
}

fn diagram_id(value: &str) -> DiagramId {
    DiagramId::new(value).expect("diagram id")
}

fn element(id: &str, name: &str, x: f64, y: f64) -> ElementRecord {
    ElementRecord::new(
        ElementId::new(id).expect("element id"),
        name,
        x,
        y,
        200,
        150,
        0,
    )
}

#[rstest]
#[case("d:sales", "diagram_sales")]
#[case("sales", "diagram_sales")]
#[case("d:7f3a-01", "diagram_7f3a_01")]
#[case("d:Orders & Invoices", "diagram_Orders___Invoices")]
fn relation_name_is_derived_deterministically(#[case] id: &str, #[case] expected: &str) {
    assert_eq!(relation_name_for(&diagram_id(id)), expected);
}

#[test]
fn create_then_list_includes_record() {
    let store = store();
    let id = diagram_id("d:sales");
    let relation_name = store.create_diagram(&id, "Sales").expect("create");
    assert_eq!(relation_name, "diagram_sales");

    let diagrams = store.list_diagrams().expect("list");
    let record = diagrams
        .iter()
        .find(|d| d.id == id)
        .expect("created diagram listed");
    assert_eq!(record.name, "Sales");
    assert_eq!(record.relation_name, "diagram_sales");
}

#[test]
fn create_with_same_id_updates_name_instead_of_erroring() {
    let store = store();
    let id = diagram_id("d:sales");
    store.create_diagram(&id, "Sales").expect("create");
    store.create_diagram(&id, "Sales v2").expect("re-create");

    let record = store.get_diagram(&id).expect("get");
    assert_eq!(record.name, "Sales v2");
    assert_eq!(record.relation_name, "diagram_sales");
    assert_eq!(store.list_diagrams().expect("list").len(), 1);
}

#[test]
fn upsert_element_is_idempotent_under_identical_payload() {
    let store = store();
    let id = diagram_id("d:sales");
    store.create_diagram(&id, "Sales").expect("create");

    let mut customer = element("n:customer", "Customer", 100.0, 100.0);
    customer.fields = vec![FieldDescriptor {
        name: "id".to_owned(),
        type_name: "uuid".to_owned(),
        nullable: false,
        primary_key: true,
    }];

    store.upsert_element(&id, &customer).expect("first upsert");
    let first = store.list_elements(&id).expect("list")[0].clone();

    store.upsert_element(&id, &customer).expect("second upsert");
    let elements = store.list_elements(&id).expect("list");
    assert_eq!(elements.len(), 1);
    assert_eq!(elements[0].name, "Customer");
    assert_eq!(elements[0].fields, customer.fields);
    assert!(elements[0].updated_at >= first.updated_at);
    assert_eq!(elements[0].created_at, first.created_at);
}

#[test]
fn list_elements_orders_by_created_at_ascending() {
    let store = store();
    let id = diagram_id("d:sales");
    store.create_diagram(&id, "Sales").expect("create");
    store
        .upsert_element(&id, &element("n:late", "Late", 0.0, 0.0))
        .expect("upsert");
    store
        .upsert_element(&id, &element("n:early", "Early", 300.0, 0.0))
        .expect("upsert");

    // Pin creation timestamps so the ordering is not at the mercy of the clock.
    {
        let conn = store.conn.lock().expect("lock");
        conn.execute(
            "UPDATE elements SET created_at = 2000 WHERE id = 'n:late'",
            [],
        )
        .expect("pin late");
        conn.execute(
            "UPDATE elements SET created_at = 1000 WHERE id = 'n:early'",
            [],
        )
        .expect("pin early");
    }

    let names: Vec<String> = store
        .list_elements(&id)
        .expect("list")
        .into_iter()
        .map(|e| e.name)
        .collect();
    assert_eq!(names, vec!["Early".to_owned(), "Late".to_owned()]);
}

#[test]
fn upsert_into_unknown_diagram_fails_with_not_found() {
    let store = store();
    store.ensure_registry_exists().expect("ensure");

    let missing = diagram_id("d:missing");
    let result = store.upsert_element(&missing, &element("n:1", "Orphan", 0.0, 0.0));
    assert!(matches!(
        result,
        Err(StoreError::DiagramNotFound { diagram_id }) if diagram_id == missing
    ));
}

#[test]
fn delete_element_is_idempotent() {
    let store = store();
    let id = diagram_id("d:sales");
    store.create_diagram(&id, "Sales").expect("create");
    store
        .upsert_element(&id, &element("n:customer", "Customer", 0.0, 0.0))
        .expect("upsert");

    let element_id = ElementId::new("n:customer").expect("element id");
    assert_eq!(store.delete_element(&id, &element_id).expect("delete"), 1);
    assert_eq!(store.delete_element(&id, &element_id).expect("redelete"), 0);
}

#[test]
fn update_element_patches_in_place() {
    let store = store();
    let id = diagram_id("d:sales");
    store.create_diagram(&id, "Sales").expect("create");
    store
        .upsert_element(&id, &element("n:customer", "Customer", 100.0, 100.0))
        .expect("upsert");

    let element_id = ElementId::new("n:customer").expect("element id");
    let patch = ElementPatch {
        name: Some("Customers".to_owned()),
        position_x: Some(250.0),
        ..ElementPatch::default()
    };
    assert_eq!(store.update_element(&id, &element_id, &patch).expect("update"), 1);

    let updated = store
        .get_element(&id, &element_id)
        .expect("get")
        .expect("element present");
    assert_eq!(updated.name, "Customers");
    assert_eq!(updated.position_x, 250.0);
    assert_eq!(updated.position_y, 100.0);

    let absent = ElementId::new("n:ghost").expect("element id");
    assert_eq!(store.update_element(&id, &absent, &patch).expect("update"), 0);
}

#[test]
fn drop_diagram_removes_registry_row_and_elements() {
    let store = store();
    let id = diagram_id("d:sales");
    store.create_diagram(&id, "Sales").expect("create");
    store
        .upsert_element(&id, &element("n:customer", "Customer", 0.0, 0.0))
        .expect("upsert");

    let relation_name = store.drop_diagram(&id).expect("drop");
    assert_eq!(relation_name, "diagram_sales");
    assert!(store.list_diagrams().expect("list").is_empty());

    let result = store.upsert_element(&id, &element("n:again", "Again", 0.0, 0.0));
    assert!(matches!(result, Err(StoreError::DiagramNotFound { .. })));
}

#[test]
fn relation_names_are_never_reused_after_drop() {
    let store = store();
    let id = diagram_id("d:sales");
    store.create_diagram(&id, "Sales").expect("create");
    store.drop_diagram(&id).expect("drop");

    let result = store.create_diagram(&id, "Sales again");
    assert!(matches!(
        result,
        Err(StoreError::RelationRetired { relation_name }) if relation_name == "diagram_sales"
    ));

    // A different id deriving the retired name is refused too.
    let result = store.create_diagram(&diagram_id("sales"), "Sales again");
    assert!(matches!(result, Err(StoreError::RelationRetired { .. })));
    assert!(store.list_diagrams().expect("list").is_empty());
}

#[test]
fn colliding_relation_names_are_a_conflict() {
    let store = store();
    store.create_diagram(&diagram_id("d:a-b"), "First").expect("create");

    // "d:a.b" derives the same relation name as "d:a-b".
    let result = store.create_diagram(&diagram_id("d:a.b"), "Second");
    assert!(matches!(
        result,
        Err(StoreError::RelationNameConflict { relation_name }) if relation_name == "diagram_a_b"
    ));
    assert_eq!(store.list_diagrams().expect("list").len(), 1);
}

#[test]
fn list_diagrams_orders_by_updated_at_descending() {
    let store = store();
    let sales = diagram_id("d:sales");
    let billing = diagram_id("d:billing");
    store.create_diagram(&sales, "Sales").expect("create");
    store.create_diagram(&billing, "Billing").expect("create");

    {
        let conn = store.conn.lock().expect("lock");
        conn.execute("UPDATE diagrams SET updated_at = 1000 WHERE id = 'd:sales'", [])
            .expect("pin sales");
        conn.execute(
            "UPDATE diagrams SET updated_at = 2000 WHERE id = 'd:billing'",
            [],
        )
        .expect("pin billing");
    }

    let names: Vec<String> = store
        .list_diagrams()
        .expect("list")
        .into_iter()
        .map(|d| d.name)
        .collect();
    assert_eq!(names, vec!["Billing".to_owned(), "Sales".to_owned()]);

    // An element write bumps the diagram back to the top.
    store
        .upsert_element(&sales, &element("n:customer", "Customer", 0.0, 0.0))
        .expect("upsert");
    let names: Vec<String> = store
        .list_diagrams()
        .expect("list")
        .into_iter()
        .map(|d| d.name)
        .collect();
    assert_eq!(names, vec!["Sales".to_owned(), "Billing".to_owned()]);
}

#[test]
fn list_elements_reports_missing_relation_specifically() {
    let store = store();
    let id = diagram_id("d:sales");
    store.create_diagram(&id, "Sales").expect("create");

    {
        let conn = store.conn.lock().expect("lock");
        conn.execute("DROP TABLE elements", []).expect("drop out-of-band");
    }

    let result = store.list_elements(&id);
    assert!(matches!(
        result,
        Err(StoreError::RelationMissing { diagram_id }) if diagram_id == id
    ));
}

#[test]
fn reconcile_removes_registry_rows_whose_storage_vanished() {
    let store = store();
    let id = diagram_id("d:sales");
    store.create_diagram(&id, "Sales").expect("create");

    {
        let conn = store.conn.lock().expect("lock");
        conn.execute("DROP TABLE elements", []).expect("drop out-of-band");
    }

    let report = store.reconcile().expect("reconcile");
    assert_eq!(report.removed_registry_rows, 1);
    assert!(store.list_diagrams().expect("list").is_empty());

    // The vanished relation's name is retired along with the registry row.
    let result = store.create_diagram(&id, "Sales again");
    assert!(matches!(result, Err(StoreError::RelationRetired { .. })));
}

#[test]
fn reconcile_sweeps_orphaned_element_rows() {
    let store = store();
    let id = diagram_id("d:sales");
    store.create_diagram(&id, "Sales").expect("create");

    {
        let conn = store.conn.lock().expect("lock");
        conn.execute(
            "INSERT INTO elements (diagram_id, id, name, kind, description, fields, \
             position_x, position_y, width, height, classification_id, created_at, updated_at) \
             VALUES ('d:gone', 'n:orphan', 'Orphan', 'table', NULL, '[]', \
             0.0, 0.0, 100, 100, NULL, 0, 0)",
            [],
        )
        .expect("insert orphan");
    }

    let report = store.reconcile().expect("reconcile");
    assert_eq!(report.removed_registry_rows, 0);
    assert_eq!(report.swept_orphan_elements, 1);
    // The intact diagram is untouched.
    assert_eq!(store.list_diagrams().expect("list").len(), 1);
}

#[test]
fn collapse_duplicate_names_keeps_most_recently_created() {
    let store = store();
    let old = diagram_id("d:sales-old");
    let new = diagram_id("d:sales-new");
    let other = diagram_id("d:billing");
    store.create_diagram(&old, "Sales").expect("create");
    store.create_diagram(&new, "Sales").expect("create");
    store.create_diagram(&other, "Billing").expect("create");
    store
        .upsert_element(&old, &element("n:stale", "Stale", 0.0, 0.0))
        .expect("upsert");

    {
        let conn = store.conn.lock().expect("lock");
        conn.execute(
            "UPDATE diagrams SET created_at = 1000 WHERE id = 'd:sales-old'",
            [],
        )
        .expect("pin old");
        conn.execute(
            "UPDATE diagrams SET created_at = 2000 WHERE id = 'd:sales-new'",
            [],
        )
        .expect("pin new");
    }

    let report = store.collapse_duplicate_names().expect("collapse");
    assert_eq!(report.deleted, 1);
    assert_eq!(report.remaining, 2);

    let ids: Vec<String> = store
        .list_diagrams()
        .expect("list")
        .into_iter()
        .map(|d| d.id.into_string())
        .collect();
    assert!(ids.contains(&"d:sales-new".to_owned()));
    assert!(ids.contains(&"d:billing".to_owned()));
    assert!(!ids.contains(&"d:sales-old".to_owned()));

    // The loser's element rows went with it, and its relation name is retired.
    let result = store.get_diagram(&old);
    assert!(matches!(result, Err(StoreError::DiagramNotFound { .. })));
    let result = store.create_diagram(&old, "Sales");
    assert!(matches!(result, Err(StoreError::RelationRetired { .. })));
}

#[test]
fn ensure_registry_exists_is_idempotent() {
    let store = store();
    store.ensure_registry_exists().expect("first");
    store.ensure_registry_exists().expect("second");
    assert!(store.list_diagrams().expect("list").is_empty());
}
