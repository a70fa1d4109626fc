use uuid::Uuid;
use yardsync_core::model::record::fields;
use yardsync_core::store::{ApplyOutcome, ConflictSide, PushedRevision, Resolution, Revision};
use yardsync_core::sync::LastWriterWins;
use yardsync_core::{DocumentStore, FieldValue, Fields, Record, RecordType};

fn remote_task(id: Uuid, title: &str, updated_at: i64) -> Revision {
    Revision {
        id,
        kind: RecordType::Task,
        created_at: 1_000,
        updated_at,
        sequence: 42,
        fields: fields([("title", title)]),
        is_deleted: false,
    }
}

fn title(store: &DocumentStore, id: Uuid) -> Option<String> {
    store
        .get_by_id(id)
        .unwrap()
        .and_then(|record| record.field("title").and_then(FieldValue::as_str).map(str::to_string))
}

#[test]
fn pending_changes_follow_sequence_and_clear_on_ack() {
    let store = DocumentStore::open_in_memory().unwrap();
    let first = store.create(RecordType::Task, fields([("title", "a")])).unwrap();
    let second = store.create(RecordType::Task, fields([("title", "b")])).unwrap();

    let pending = store.pending_changes(10).unwrap();
    assert_eq!(
        pending.iter().map(|record| record.id).collect::<Vec<_>>(),
        vec![first, second]
    );

    let acked = store
        .mark_pushed(&[PushedRevision {
            id: first,
            sequence: pending[0].sequence,
        }])
        .unwrap();
    assert_eq!(acked, 1);
    let remaining = store.pending_changes(10).unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].id, second);
}

#[test]
fn stale_ack_keeps_newer_local_edit_pending() {
    let store = DocumentStore::open_in_memory().unwrap();
    let id = store.create(RecordType::Task, fields([("title", "v1")])).unwrap();
    let pushed_sequence = store.pending_changes(1).unwrap()[0].sequence;

    store.update(id, fields([("title", "v2")])).unwrap();
    let cleared = store
        .mark_pushed(&[PushedRevision {
            id,
            sequence: pushed_sequence,
        }])
        .unwrap();

    assert_eq!(cleared, 0);
    assert_eq!(store.pending_changes(10).unwrap().len(), 1);
}

#[test]
fn remote_insert_and_delete_are_not_pushed_back() {
    let store = DocumentStore::open_in_memory().unwrap();
    let id = Uuid::new_v4();

    let inserted = store
        .apply_remote(&remote_task(id, "from remote", 5_000), &LastWriterWins)
        .unwrap();
    assert_eq!(inserted, ApplyOutcome::Inserted { sequence: 1 });
    assert_eq!(title(&store, id).as_deref(), Some("from remote"));
    assert!(store.pending_changes(10).unwrap().is_empty());

    let mut tombstone = remote_task(id, "from remote", 6_000);
    tombstone.is_deleted = true;
    tombstone.fields = Fields::new();
    let deleted = store.apply_remote(&tombstone, &LastWriterWins).unwrap();
    assert_eq!(deleted, ApplyOutcome::Deleted { sequence: 2 });
    assert!(store.get_by_id(id).unwrap().is_none());

    let again = store.apply_remote(&tombstone, &LastWriterWins).unwrap();
    assert_eq!(again, ApplyOutcome::Skipped);
}

#[test]
fn newer_remote_wins_and_local_loser_is_kept() {
    let store = DocumentStore::open_in_memory().unwrap();
    let id = Uuid::new_v4();
    store
        .apply_remote(&remote_task(id, "base", 1_000), &LastWriterWins)
        .unwrap();
    store.update(id, fields([("title", "local edit")])).unwrap();

    let remote = remote_task(id, "remote edit", i64::MAX / 2);
    let outcome = store.apply_remote(&remote, &LastWriterWins).unwrap();
    assert!(matches!(
        outcome,
        ApplyOutcome::Conflict {
            winner: Resolution::TakeRemote,
            ..
        }
    ));
    assert_eq!(title(&store, id).as_deref(), Some("remote edit"));
    assert!(store.pending_changes(10).unwrap().is_empty());

    let conflicts = store.conflicts_for(id).unwrap();
    assert_eq!(conflicts.len(), 1);
    assert_eq!(conflicts[0].losing_side, ConflictSide::Local);
    assert_eq!(conflicts[0].losing_fields, fields([("title", "local edit")]));
}

#[test]
fn newer_local_edit_wins_and_remote_loser_is_kept() {
    let store = DocumentStore::open_in_memory().unwrap();
    let id = Uuid::new_v4();
    store
        .apply_remote(&remote_task(id, "base", 1_000), &LastWriterWins)
        .unwrap();
    store.update(id, fields([("title", "local edit")])).unwrap();

    let outcome = store
        .apply_remote(&remote_task(id, "stale remote", 2_000), &LastWriterWins)
        .unwrap();
    assert!(matches!(
        outcome,
        ApplyOutcome::Conflict {
            winner: Resolution::KeepLocal,
            ..
        }
    ));
    assert_eq!(title(&store, id).as_deref(), Some("local edit"));
    assert_eq!(store.pending_changes(10).unwrap().len(), 1);

    let conflicts = store.conflicts_for(id).unwrap();
    assert_eq!(conflicts[0].losing_side, ConflictSide::Remote);
    assert_eq!(conflicts[0].losing_fields, fields([("title", "stale remote")]));
}

#[test]
fn custom_merge_resolver_writes_a_pending_revision() {
    let store = DocumentStore::open_in_memory().unwrap();
    let id = Uuid::new_v4();
    store
        .apply_remote(&remote_task(id, "base", 1_000), &LastWriterWins)
        .unwrap();
    store.update(id, fields([("title", "mine")])).unwrap();

    let merge = |local: &Record, remote: &Revision| {
        let local_title = local.field("title").and_then(FieldValue::as_str).unwrap_or("");
        let remote_title = remote.fields.get("title").and_then(FieldValue::as_str).unwrap_or("");
        Resolution::Merge(fields([("title", format!("{local_title} + {remote_title}"))]))
    };
    let outcome = store
        .apply_remote(&remote_task(id, "theirs", 2_000), &merge)
        .unwrap();

    assert!(matches!(outcome, ApplyOutcome::Conflict { winner: Resolution::Merge(_), .. }));
    assert_eq!(title(&store, id).as_deref(), Some("mine + theirs"));
    assert_eq!(store.pending_changes(10).unwrap().len(), 1);
    assert_eq!(store.conflicts_for(id).unwrap().len(), 1);
}

#[test]
fn revisions_that_break_the_schema_are_rejected_unchanged() {
    let store = DocumentStore::open_in_memory().unwrap();
    let id = Uuid::new_v4();
    let mut bad = remote_task(id, "x", 1_000);
    bad.fields.insert("colour".to_string(), "red".into());

    let outcome = store.apply_remote(&bad, &LastWriterWins).unwrap();
    assert!(matches!(outcome, ApplyOutcome::Rejected { .. }));
    assert!(store.get_by_id(id).unwrap().is_none());

    store
        .apply_remote(&remote_task(id, "task", 1_000), &LastWriterWins)
        .unwrap();
    let mut wrong_type = remote_task(id, "task", 2_000);
    wrong_type.kind = RecordType::Wagon;
    wrong_type.fields = fields([("wagonNumber", "WGN-1"), ("status", "Available")]);
    let outcome = store.apply_remote(&wrong_type, &LastWriterWins).unwrap();
    assert!(matches!(outcome, ApplyOutcome::Rejected { .. }));
    assert_eq!(title(&store, id).as_deref(), Some("task"));
}

#[test]
fn checkpoints_are_saved_per_endpoint_and_cleared_by_reset() {
    let store = DocumentStore::open_in_memory().unwrap();
    assert_eq!(store.checkpoint("ws://a/db").unwrap(), None);

    store.save_checkpoint("ws://a/db", Some("7")).unwrap();
    store.save_checkpoint("ws://a/db", Some("9")).unwrap();
    store.save_checkpoint("ws://b/db", Some("1")).unwrap();
    assert_eq!(store.checkpoint("ws://a/db").unwrap().as_deref(), Some("9"));
    assert_eq!(store.checkpoint("ws://b/db").unwrap().as_deref(), Some("1"));

    store.reset_all().unwrap();
    assert_eq!(store.checkpoint("ws://a/db").unwrap(), None);
}

#[test]
fn prune_conflicts_drops_old_history() {
    let store = DocumentStore::open_in_memory().unwrap();
    let id = Uuid::new_v4();
    store
        .apply_remote(&remote_task(id, "base", 1_000), &LastWriterWins)
        .unwrap();
    store.update(id, fields([("title", "local")])).unwrap();
    store
        .apply_remote(&remote_task(id, "old", 2_000), &LastWriterWins)
        .unwrap();
    assert_eq!(store.conflicts_for(id).unwrap().len(), 1);

    assert_eq!(store.prune_conflicts(i64::MAX).unwrap(), 1);
    assert!(store.conflicts_for(id).unwrap().is_empty());
}
