use super::digest::{Digest, DIGEST_LEN};
use sha2::{Digest as _, Sha256};
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

/// Fixed read buffer. Content is streamed through it and never held whole.
pub const HASH_BUFFER_SIZE: usize = 64 * 1024;

pub fn hash_reader<R: Read + ?Sized>(reader: &mut R) -> io::Result<Digest> {
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; HASH_BUFFER_SIZE];
    loop {
        let n = match reader.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        hasher.update(&buffer[..n]);
    }
    Ok(finish(hasher))
}

pub fn hash_file(path: &Path) -> io::Result<Digest> {
    let mut file = File::open(path)?;
    hash_reader(&mut file)
}

pub fn hash_bytes(data: &[u8]) -> Digest {
    let mut hasher = Sha256::new();
    hasher.update(data);
    finish(hasher)
}

fn finish(hasher: Sha256) -> Digest {
    let out = hasher.finalize();
    let mut bytes = [0u8; DIGEST_LEN];
    bytes.copy_from_slice(&out);
    Digest::new(bytes)
}
