use sha2::{Digest, Sha256};

/// Cheap, deterministic change-detection fingerprint: `"{size}-{mtime_ms}"`.
///
/// Not cryptographic and never used as a chunk `id` — see [`chunk_id`].
pub fn fingerprint(size: u64, mtime_ms: u64) -> String {
  format!("{size}-{mtime_ms}")
}

/// Content-addressed chunk identifier: digest of `(path, page, offset)`.
///
/// Injective over its inputs, so re-indexing the same chunk produces the
/// same `id` and merge-upsert replaces it in place (data model invariant 3).
pub fn chunk_id(path: &str, page: i64, offset: i64) -> String {
  let mut hasher = Sha256::new();
  hasher.update(path.as_bytes());
  hasher.update(b"\0");
  hasher.update(page.to_le_bytes());
  hasher.update(b"\0");
  hasher.update(offset.to_le_bytes());
  let digest = hasher.finalize();
  hex_encode(&digest)
}

fn hex_encode(bytes: &[u8]) -> String {
  let mut out = String::with_capacity(bytes.len() * 2);
  for b in bytes {
    out.push_str(&format!("{b:02x}"));
  }
  out
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn fingerprint_format() {
    assert_eq!(fingerprint(123, 456), "123-456");
  }

  #[test]
  fn chunk_id_is_deterministic() {
    let a = chunk_id("/a/b.txt", 0, 10);
    let b = chunk_id("/a/b.txt", 0, 10);
    assert_eq!(a, b);
  }

  #[test]
  fn chunk_id_is_injective_over_offset() {
    let a = chunk_id("/a/b.txt", 0, 10);
    let b = chunk_id("/a/b.txt", 0, 20);
    assert_ne!(a, b);
  }

  #[test]
  fn chunk_id_is_injective_over_page() {
    let a = chunk_id("/a/b.txt", 0, 10);
    let b = chunk_id("/a/b.txt", 1, 10);
    assert_ne!(a, b);
  }

  #[test]
  fn chunk_id_is_injective_over_path() {
    let a = chunk_id("/a/b.txt", 0, 10);
    let b = chunk_id("/a/c.txt", 0, 10);
    assert_ne!(a, b);
  }
}
