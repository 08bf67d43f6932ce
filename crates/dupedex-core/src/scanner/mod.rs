mod skip;
mod walk;

pub use skip::SkipPolicy;
pub use walk::{ScanOptions, ScanReport, Walker};
