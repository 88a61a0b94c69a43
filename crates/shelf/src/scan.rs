use std::path::PathBuf;

use library::{Collection, IndexOptions, IndexStats, LibraryError};
use tokio::task::JoinError;
use tracing::warn;

/// Builds the first snapshot on the blocking pool.
pub async fn open<E>(root: PathBuf, options: IndexOptions) -> Result<(Collection, IndexStats), E>
where
    E: From<LibraryError> + From<JoinError>,
{
    let result = tokio::task::spawn_blocking(move || Collection::open(root, options)).await;
    match result {
        Ok(Ok(opened)) => Ok(opened),
        Ok(Err(err)) => {
            warn!("Collection scan failed: {}", err);
            Err(err.into())
        }
        Err(err) => {
            warn!("Collection scan join error: {}", err);
            Err(err.into())
        }
    }
}

/// Full rebuild on the blocking pool; readers keep the old snapshot until
/// the swap.
pub async fn reindex<E>(collection: &Collection) -> Result<IndexStats, E>
where
    E: From<LibraryError> + From<JoinError>,
{
    let collection = collection.clone();
    let result = tokio::task::spawn_blocking(move || collection.reindex()).await;
    match result {
        Ok(Ok(stats)) => Ok(stats),
        Ok(Err(err)) => {
            warn!("Reindex failed: {}", err);
            Err(err.into())
        }
        Err(err) => {
            warn!("Reindex join error: {}", err);
            Err(err.into())
        }
    }
}
