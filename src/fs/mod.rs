//! Filesystem access used by source-tree detection
//!
//! Detection only ever reads: it inspects the top level of an application
//! tree for manifests, lock files and Python modules. Going through a trait
//! keeps that logic testable against an in-memory tree.

mod mock;
mod real;
mod r#trait;

pub use mock::MockFileSystem;
pub use r#trait::{DirEntry, EntryKind, FileSystem};
pub use real::RealFileSystem;
