//! Content hashing.
//!
//! Identity is always derived from bytes: renames, moves and duplicate
//! uploads of the same file resolve to the same hash.

use std::path::Path;

use serde::Serialize;
use sha2::{Digest, Sha256};
use tokio::io::AsyncReadExt;

use crate::error::CacheResult;

const READ_BUFFER_SIZE: usize = 64 * 1024;

/// SHA-256 of a file's contents, streamed.
pub async fn hash_file(path: impl AsRef<Path>) -> CacheResult<String> {
    let mut file = tokio::fs::File::open(path.as_ref()).await?;
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; READ_BUFFER_SIZE];
    loop {
        let n = file.read(&mut buffer).await?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

pub fn hash_bytes(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Hash of a value's canonical JSON serialization.
pub fn hash_json<T: Serialize + ?Sized>(value: &T) -> CacheResult<String> {
    let bytes = serde_json::to_vec(value)?;
    Ok(hash_bytes(&bytes))
}

/// Order-sensitive combination of several hashes/version tags into one key.
pub fn combine_hashes<I, S>(parts: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part.as_ref().as_bytes());
        // Separator keeps ("ab","c") and ("a","bc") distinct.
        hasher.update([0u8]);
    }
    hex::encode(hasher.finalize())
}
