//! Default conflict policy.

use crate::model::record::Record;
use crate::store::{ConflictResolver, Resolution, Revision};

/// Newer `updated_at` wins. On a tie the remote revision wins, so every
/// peer applying the same pair ends with the same state.
#[derive(Debug, Clone, Copy, Default)]
pub struct LastWriterWins;

impl ConflictResolver for LastWriterWins {
    fn resolve(&self, local: &Record, remote: &Revision) -> Resolution {
        if local.updated_at > remote.updated_at {
            Resolution::KeepLocal
        } else {
            Resolution::TakeRemote
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::record::{fields, RecordType};
    use uuid::Uuid;

    fn local(updated_at: i64) -> Record {
        Record {
            id: Uuid::nil(),
            kind: RecordType::Task,
            created_at: 1,
            updated_at,
            sequence: 3,
            fields: fields([("title", "local")]),
            is_deleted: false,
        }
    }

    fn remote(updated_at: i64) -> Revision {
        Revision {
            updated_at,
            fields: fields([("title", "remote")]),
            ..Revision::from(&local(0))
        }
    }

    #[test]
    fn newer_side_wins_and_tie_goes_remote() {
        assert_eq!(LastWriterWins.resolve(&local(20), &remote(10)), Resolution::KeepLocal);
        assert_eq!(LastWriterWins.resolve(&local(10), &remote(20)), Resolution::TakeRemote);
        assert_eq!(LastWriterWins.resolve(&local(10), &remote(10)), Resolution::TakeRemote);
    }
}
