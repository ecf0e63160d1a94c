pub mod extendible_hash_index;
pub mod key_hasher;

pub use extendible_hash_index::ExtendibleHashIndex;
pub use key_hasher::{DefaultKeyHasher, IdentityKeyHasher, KeyHasher};
