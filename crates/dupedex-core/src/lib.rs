pub mod archive;
pub mod bucket;
pub mod compare;
pub mod config;
pub mod context;
pub mod engine;
pub mod error;
pub mod export;
pub mod hasher;
pub mod platform;
pub mod progress;
pub mod scanner;
pub mod storage;

pub use bucket::Bucket;
pub use config::AppConfig;
pub use context::ScanContext;
pub use engine::{DupesResult, Engine};
pub use error::{Error, ErrorKind};
pub use hasher::Digest;
pub use progress::{ProgressReporter, SilentReporter};
pub use storage::OpenMode;
