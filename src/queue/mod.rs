//! Folder-backed work queue
//!
//! The vault's stage directories are the only state shared between processes. This
//! module owns every read and write against them.

mod folder;

pub use folder::{Admission, MAX_NAME_ATTEMPTS, QueueFolder};
