mod index;
mod txn;
mod verify;

pub use index::{Index, OpenMode, Store};
pub use txn::{ReadTxn, WriteTxn};
pub use verify::{dir_size, verify, IndexStatus};
