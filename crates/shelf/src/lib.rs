pub mod config;
pub mod file_ids;
pub mod normalize;
pub mod paging;
pub mod scan;
pub mod state;
pub mod store;
pub mod transcode;
pub mod votes;

#[cfg(test)]
mod test_support;

pub use state::{Shelf, ShelfError};
