//! Whitespace-insensitive file fingerprint used by the CurseForge registry.
//!
//! MurmurHash2 (seed 1) over the file bytes with tab, LF, CR and space removed.
//! Only used to identify local files; download integrity is always SHA-1.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tracing::warn;

use crate::core::error::{LauncherError, LauncherResult};

const SEED: u32 = 1;
const M: u32 = 0x5bd1_e995;
const R: u32 = 24;

fn is_ignored(byte: u8) -> bool {
    matches!(byte, 9 | 10 | 13 | 32)
}

pub fn fingerprint_bytes(data: &[u8]) -> u32 {
    let normalized: Vec<u8> = data.iter().copied().filter(|b| !is_ignored(*b)).collect();
    murmur2(&normalized, SEED)
}

pub async fn fingerprint_file(path: &Path) -> LauncherResult<u32> {
    let data = tokio::fs::read(path)
        .await
        .map_err(|e| LauncherError::io(path, e))?;
    Ok(fingerprint_bytes(&data))
}

/// Fingerprint several files. Unreadable files are logged and left out.
pub async fn fingerprint_files<I, P>(paths: I) -> BTreeMap<PathBuf, u32>
where
    I: IntoIterator<Item = P>,
    P: AsRef<Path>,
{
    let mut out = BTreeMap::new();
    for path in paths {
        let path = path.as_ref();
        match fingerprint_file(path).await {
            Ok(fp) => {
                out.insert(path.to_path_buf(), fp);
            }
            Err(e) => warn!("Skipping fingerprint for {:?}: {}", path, e),
        }
    }
    out
}

fn murmur2(data: &[u8], seed: u32) -> u32 {
    if data.is_empty() {
        return 0;
    }

    let mut h = seed ^ data.len() as u32;
    let mut chunks = data.chunks_exact(4);
    for chunk in &mut chunks {
        let mut k = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        k = k.wrapping_mul(M);
        k ^= k >> R;
        k = k.wrapping_mul(M);
        h = h.wrapping_mul(M);
        h ^= k;
    }

    let tail = chunks.remainder();
    if tail.len() >= 3 {
        h ^= (tail[2] as u32) << 16;
    }
    if tail.len() >= 2 {
        h ^= (tail[1] as u32) << 8;
    }
    if !tail.is_empty() {
        h ^= tail[0] as u32;
        h = h.wrapping_mul(M);
    }

    h ^= h >> 13;
    h = h.wrapping_mul(M);
    h ^= h >> 15;
    h
}
