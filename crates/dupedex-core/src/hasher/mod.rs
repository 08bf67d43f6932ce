mod digest;
mod sha256;

pub use digest::{Digest, DIGEST_LEN};
pub use sha256::{hash_bytes, hash_file, hash_reader, HASH_BUFFER_SIZE};
