use std::path::Path;
use std::sync::Arc;

use redb::{Database, ReadableTable, TableDefinition, TableError};

use crate::store::{open_or_create_db, StoreError};

const FILE_IDS_TABLE: TableDefinition<&str, &str> = TableDefinition::new("file_ids");

/// Provider-issued identifiers for files that were already uploaded once,
/// keyed by file name.
#[derive(Clone)]
pub struct FileIdCache {
    db: Arc<Database>,
}

impl FileIdCache {
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let cache = Self {
            db: Arc::new(open_or_create_db(path)?),
        };
        let write_txn = cache.db.begin_write()?;
        {
            let _ = write_txn.open_table(FILE_IDS_TABLE)?;
        }
        write_txn.commit()?;
        Ok(cache)
    }

    pub fn get(&self, filename: &str) -> Result<Option<String>, StoreError> {
        let read_txn = self.db.begin_read()?;
        let table = match read_txn.open_table(FILE_IDS_TABLE) {
            Ok(table) => table,
            Err(TableError::TableDoesNotExist(_)) => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        let id = table.get(filename)?.map(|value| value.value().to_string());
        Ok(id)
    }

    pub fn set(&self, filename: &str, id: &str) -> Result<(), StoreError> {
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(FILE_IDS_TABLE)?;
            table.insert(filename, id)?;
        }
        write_txn.commit()?;
        Ok(())
    }

    /// Returns whether an identifier was stored.
    pub fn remove(&self, filename: &str) -> Result<bool, StoreError> {
        let write_txn = self.db.begin_write()?;
        let removed = {
            let mut table = write_txn.open_table(FILE_IDS_TABLE)?;
            let removed = table.remove(filename)?.is_some();
            removed
        };
        write_txn.commit()?;
        Ok(removed)
    }

    pub fn len(&self) -> Result<usize, StoreError> {
        let read_txn = self.db.begin_read()?;
        let table = match read_txn.open_table(FILE_IDS_TABLE) {
            Ok(table) => table,
            Err(TableError::TableDoesNotExist(_)) => return Ok(0),
            Err(err) => return Err(err.into()),
        };
        Ok(table.len()? as usize)
    }
}
