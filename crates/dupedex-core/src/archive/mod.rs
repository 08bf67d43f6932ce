//! Archive containers whose members are hashed in place, without extracting
//! anything to disk.

mod format;
mod inspector;
mod readers;
mod safe_path;

pub use format::{ArchiveFormat, FormatCache};
pub use inspector::{ArchiveInspector, ArchiveMember, InspectReport};
pub use safe_path::member_key;
