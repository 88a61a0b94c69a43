use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use redb::{Database, ReadableTable, TableDefinition, TableError};

use crate::store::{decode_value, encode_value, open_or_create_db, StoreError};

/// caption -> bincode `HashMap<user, last vote unix secs>`
const VOTES_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("votes");

type Voters = HashMap<String, u64>;

#[derive(Clone)]
pub struct VoteStore {
    db: Arc<Database>,
}

impl VoteStore {
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let store = Self::new(Arc::new(open_or_create_db(path)?));
        store.init_tables()?;
        Ok(store)
    }

    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    pub fn init_tables(&self) -> Result<(), StoreError> {
        let write_txn = self.db.begin_write()?;
        {
            let _ = write_txn.open_table(VOTES_TABLE)?;
        }
        write_txn.commit()?;
        Ok(())
    }

    pub fn rate(&self, user: &str, caption: &str) -> Result<(), StoreError> {
        self.rate_at(user, caption, now_secs())
    }

    /// Records `user`'s vote for `caption` at `timestamp`, replacing any
    /// earlier vote by the same user. Committed before returning.
    pub fn rate_at(&self, user: &str, caption: &str, timestamp: u64) -> Result<(), StoreError> {
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(VOTES_TABLE)?;
            let mut voters: Voters = match table.get(caption)? {
                Some(value) => decode_value(value.value())?,
                None => Voters::new(),
            };
            voters.insert(user.to_string(), timestamp);
            let bytes = encode_value(&voters)?;
            table.insert(caption, bytes.as_slice())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    /// Number of distinct users who voted for `caption`.
    pub fn votes(&self, caption: &str) -> Result<usize, StoreError> {
        Ok(self.voters(caption)?.map(|voters| voters.len()).unwrap_or(0))
    }

    pub fn voted_at(&self, user: &str, caption: &str) -> Result<Option<u64>, StoreError> {
        Ok(self
            .voters(caption)?
            .and_then(|voters| voters.get(user).copied()))
    }

    pub fn liked_tracks(&self, user: &str) -> Result<Vec<String>, StoreError> {
        let mut liked = Vec::new();
        for (caption, voters) in self.entries()? {
            if voters.contains_key(user) {
                liked.push(caption);
            }
        }
        Ok(liked)
    }

    /// Up to `limit` captions by descending voter count; equal counts keep
    /// key order.
    pub fn top(&self, limit: usize) -> Result<Vec<String>, StoreError> {
        let mut counted: Vec<(String, usize)> = self
            .entries()?
            .into_iter()
            .map(|(caption, voters)| (caption, voters.len()))
            .collect();
        counted.sort_by(|a, b| b.1.cmp(&a.1));
        Ok(counted
            .into_iter()
            .take(limit)
            .map(|(caption, _)| caption)
            .collect())
    }

    fn voters(&self, caption: &str) -> Result<Option<Voters>, StoreError> {
        let read_txn = self.db.begin_read()?;
        let table = match read_txn.open_table(VOTES_TABLE) {
            Ok(table) => table,
            Err(TableError::TableDoesNotExist(_)) => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        let voters = match table.get(caption)? {
            Some(value) => Some(decode_value(value.value())?),
            None => None,
        };
        Ok(voters)
    }

    fn entries(&self) -> Result<Vec<(String, Voters)>, StoreError> {
        let read_txn = self.db.begin_read()?;
        let table = match read_txn.open_table(VOTES_TABLE) {
            Ok(table) => table,
            Err(TableError::TableDoesNotExist(_)) => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };
        let mut items = Vec::new();
        for entry in table.iter()? {
            let entry = entry?;
            let voters: Voters = decode_value(entry.1.value())?;
            items.push((entry.0.value().to_string(), voters));
        }
        Ok(items)
    }
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|value| value.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn open_store(dir: &TempDir) -> VoteStore {
        VoteStore::open(&dir.path().join("votes.redb")).unwrap()
    }

    #[test]
    fn revote_overwrites_timestamp() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);
        store.rate_at("alice", "Track X", 100).unwrap();
        store.rate_at("alice", "Track X", 250).unwrap();
        assert_eq!(store.votes("Track X").unwrap(), 1);
        assert_eq!(store.voted_at("alice", "Track X").unwrap(), Some(250));
        assert_eq!(store.voted_at("bob", "Track X").unwrap(), None);
    }

    #[test]
    fn unknown_track_has_no_votes() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);
        assert_eq!(store.votes("nothing").unwrap(), 0);
        assert!(store.liked_tracks("alice").unwrap().is_empty());
        assert!(store.top(10).unwrap().is_empty());
    }

    #[test]
    fn top_orders_by_voter_count() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);
        for user in ["u1", "u2", "u3"] {
            store.rate(user, "A").unwrap();
        }
        store.rate("u1", "B").unwrap();
        store.rate("u1", "C").unwrap();
        store.rate("u2", "C").unwrap();
        assert_eq!(store.top(100).unwrap(), vec!["A", "C", "B"]);
        assert_eq!(store.top(2).unwrap(), vec!["A", "C"]);
    }

    #[test]
    fn ties_keep_key_order() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);
        for caption in ["delta", "alpha", "charlie", "bravo"] {
            store.rate("u1", caption).unwrap();
        }
        assert_eq!(
            store.top(10).unwrap(),
            vec!["alpha", "bravo", "charlie", "delta"]
        );
    }

    #[test]
    fn liked_tracks_are_per_user() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);
        store.rate("alice", "One").unwrap();
        store.rate("bob", "Two").unwrap();
        store.rate("alice", "Three").unwrap();
        assert_eq!(store.liked_tracks("alice").unwrap(), vec!["One", "Three"]);
        assert_eq!(store.liked_tracks("bob").unwrap(), vec!["Two"]);
    }

    #[test]
    fn votes_survive_reopen() {
        let dir = TempDir::new().unwrap();
        {
            let store = open_store(&dir);
            store.rate_at("alice", "Kept", 42).unwrap();
        }
        let store = open_store(&dir);
        assert_eq!(store.voted_at("alice", "Kept").unwrap(), Some(42));
    }
}
