//! Common utilities shared across modules.

use sha2::{Digest, Sha256};
use std::io::Write;
use std::path::Path;

/// SHA-256 of `text` as lowercase hex.
pub fn content_hash(text: &str) -> String {
    format!("{:x}", Sha256::digest(text.as_bytes()))
}

/// Truncate to at most `max_chars` characters without splitting a code point.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => &text[..byte_idx],
        None => text,
    }
}

/// Turn a suite name into a file-system friendly stem.
///
/// Whitespace becomes `_`, path separators and other reserved characters are dropped.
pub fn slugify(name: &str) -> String {
    let slug: String = name
        .trim()
        .chars()
        .filter_map(|c| match c {
            c if c.is_whitespace() => Some('_'),
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => None,
            c => Some(c),
        })
        .collect();

    if slug.is_empty() || slug.chars().all(|c| c == '.') {
        "default".to_string()
    } else {
        slug
    }
}

/// File stem for a suite: the slug plus a short hash of the exact name.
///
/// Names that slug alike ("Login Suite", "Login_Suite") still get distinct files.
pub fn suite_file_stem(name: &str) -> String {
    format!("{}-{}", slugify(name), &content_hash(name)[..8])
}

/// Write `bytes` to `path` through a temp file in the same directory and a rename.
///
/// Readers see either the old file or the new one, never a partial write.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir)?;

    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}
