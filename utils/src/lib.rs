//! Shared infrastructure utilities for strata.
//!
//! - **`atomic_write`**: Crash-safe file persistence (temp + rename)
//! - **`tree`**: Deterministic walking, digesting and copying of directory trees

pub mod atomic_write;
pub mod tree;

pub use atomic_write::{
    AtomicWriteOptions, FileSyncPolicy, PersistMode, atomic_write, atomic_write_with_options,
};
pub use tree::{
    PathFilter, TreeEntry, copy_tree, hash_file, is_missing_or_empty_dir, remove_dir_if_exists,
    set_normalized_mode, tree_digest, tree_digest_filtered, walk_files,
};
