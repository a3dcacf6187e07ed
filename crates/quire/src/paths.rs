use std::collections::HashMap;
use std::fs;
use std::path::Path;

use sha2::{Digest, Sha256};

use crate::error::{IoContext, Result};

pub const DEFAULT_DIGEST_LENGTH: usize = 8;
const MIN_DIGEST_LENGTH: usize = 4;
const MAX_DIGEST_LENGTH: usize = 64;

/// Renders a path with `/` separators regardless of platform.
pub fn to_portable_path(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

/// Portable form of `path` relative to `base`, or of `path` itself when it
/// does not live under `base`.
pub fn relative_portable(path: &Path, base: &Path) -> String {
    to_portable_path(path.strip_prefix(base).unwrap_or(path))
}

/// Lowercase hex prefix of the SHA-256 of `bytes`. `length` is clamped to
/// `4..=64`.
pub fn digest_of(bytes: &[u8], length: usize) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    let hash_hex = format!("{:x}", hasher.finalize());
    let length = length.clamp(MIN_DIGEST_LENGTH, MAX_DIGEST_LENGTH);
    hash_hex[..length].to_string()
}

pub fn digest_file(path: &Path, length: usize) -> Result<String> {
    let content = fs::read(path).io_context("hashing", path)?;
    Ok(digest_of(&content, length))
}

/// Memoizes `regex::escape` for the lifetime of one build.
#[derive(Debug, Default)]
pub struct PatternEscaper {
    cache: HashMap<String, String>,
}

impl PatternEscaper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn escape(&mut self, value: &str) -> &str {
        self.cache
            .entry(value.to_string())
            .or_insert_with(|| regex::escape(value))
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }
}
