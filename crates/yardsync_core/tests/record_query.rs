use yardsync_core::model::record::fields;
use yardsync_core::{
    DocumentStore, RecordQuery, RecordType, SchemaError, SortDirection, SortKey, StoreError,
};

fn create_wagon(store: &DocumentStore, number: &str) -> yardsync_core::RecordId {
    store
        .create(
            RecordType::Wagon,
            fields([("wagonNumber", number), ("status", "Available")]),
        )
        .unwrap()
}

fn numbers(records: &[yardsync_core::Record]) -> Vec<String> {
    records
        .iter()
        .map(|record| {
            record
                .field("wagonNumber")
                .and_then(|value| value.as_str())
                .unwrap_or_default()
                .to_string()
        })
        .collect()
}

#[test]
fn wagon_number_ascending_is_lexicographic_and_stable_for_ties() {
    let store = DocumentStore::open_in_memory().unwrap();
    let mut duplicate_ids = Vec::new();
    for number in ["WGN-300", "WGN-1001", "WGN-20", "WGN-300", "WGN-0999"] {
        let id = create_wagon(&store, number);
        if number == "WGN-300" {
            duplicate_ids.push(id);
        }
    }

    let query = RecordQuery::of(RecordType::Wagon)
        .order_by(SortKey::field("wagonNumber"), SortDirection::Asc);
    let wagons = store.query(&query).unwrap();

    assert_eq!(
        numbers(&wagons),
        vec!["WGN-0999", "WGN-1001", "WGN-20", "WGN-300", "WGN-300"]
    );
    duplicate_ids.sort();
    let tie_ids: Vec<_> = wagons[3..].iter().map(|record| record.id).collect();
    assert_eq!(tie_ids, duplicate_ids);
}

#[test]
fn descending_field_order_keeps_id_order_for_ties() {
    let store = DocumentStore::open_in_memory().unwrap();
    let mut tied = vec![create_wagon(&store, "WGN-5"), create_wagon(&store, "WGN-5")];
    create_wagon(&store, "WGN-9");

    let query = RecordQuery::of(RecordType::Wagon)
        .order_by(SortKey::field("wagonNumber"), SortDirection::Desc);
    let wagons = store.query(&query).unwrap();

    assert_eq!(numbers(&wagons), vec!["WGN-9", "WGN-5", "WGN-5"]);
    tied.sort();
    assert_eq!(vec![wagons[1].id, wagons[2].id], tied);
}

#[test]
fn sequence_order_and_limit() {
    let store = DocumentStore::open_in_memory().unwrap();
    for number in ["A", "B", "C", "D"] {
        create_wagon(&store, number);
    }

    let newest_two = store
        .query(
            &RecordQuery::of(RecordType::Wagon)
                .order_by(SortKey::Sequence, SortDirection::Desc)
                .limit(2),
        )
        .unwrap();
    assert_eq!(numbers(&newest_two), vec!["D", "C"]);
}

#[test]
fn queries_are_scoped_to_one_type_and_skip_tombstones() {
    let store = DocumentStore::open_in_memory().unwrap();
    create_wagon(&store, "WGN-1");
    let gone = create_wagon(&store, "WGN-2");
    store.delete(gone).unwrap();
    store
        .create(RecordType::Task, fields([("title", "not a wagon")]))
        .unwrap();

    let wagons = store.get(RecordType::Wagon).unwrap();
    assert_eq!(numbers(&wagons), vec!["WGN-1"]);
    assert_eq!(store.get(RecordType::Task).unwrap().len(), 1);
    assert!(store.get(RecordType::Operation).unwrap().is_empty());
}

#[test]
fn ordering_by_unknown_field_is_a_configuration_error() {
    let store = DocumentStore::open_in_memory().unwrap();
    let err = store
        .query(
            &RecordQuery::of(RecordType::Task)
                .order_by(SortKey::field("wagonNumber"), SortDirection::Asc),
        )
        .unwrap_err();
    assert!(matches!(
        err,
        StoreError::Schema(SchemaError::UnknownField { .. })
    ));
}
