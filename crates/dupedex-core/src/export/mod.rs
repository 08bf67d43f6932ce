//! Plain-text bucket dumps: a `DUPEDEX-BUCKET#<bucket>` header line followed
//! by `<hex digest>,<path relative to the bucket>` rows.

mod table;

pub use table::{export_bucket, import_bucket, ImportReport, HEADER_TOKEN};
