pub mod access_entry;
pub mod cluster;
pub mod collection;
pub mod database_user;
pub mod search_index;

pub use access_entry::AccessEntrySpec;
pub use cluster::ClusterSpec;
pub use collection::CollectionSpec;
pub use database_user::DatabaseUserSpec;
pub use search_index::{Quantization, SearchIndexSpec, Similarity, VectorField};

pub(crate) fn require(field: &str, value: &str) -> Result<(), String> {
    if value.trim().is_empty() {
        Err(format!("{field} must not be empty"))
    } else {
        Ok(())
    }
}
