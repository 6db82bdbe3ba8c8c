use parking_lot::Mutex;
use qr_common::math::ChunkPos;
use std::collections::HashMap;

/// The authoritative chunk -> owner mapping. A chunk with no entry has never
/// been requested anywhere.
///
/// Both write operations only ever install an endpoint handed in by the
/// server calling `PEER_CHUNK`, so every rewrite is monotone: the new value
/// is either the old value or the caller's, never a third one.
pub struct Registry {
  zone: Mutex<HashMap<ChunkPos, String>>,
}

impl Registry {
  pub fn new() -> Self { Registry { zone: Mutex::new(HashMap::new()) } }

  /// Returns the current owner of the chunk.
  pub fn get(&self, chunk_id: ChunkPos) -> Option<String> {
    self.zone.lock().get(&chunk_id).cloned()
  }

  /// Records the caller as owner if the chunk has never been requested.
  /// Returns the existing owner otherwise.
  pub fn install_if_absent(&self, chunk_id: ChunkPos, caller_ip: &str) -> Option<String> {
    let mut zone = self.zone.lock();
    match zone.get(&chunk_id) {
      Some(owner) => Some(owner.clone()),
      None => {
        zone.insert(chunk_id, caller_ip.to_string());
        None
      }
    }
  }

  /// Rewrites the owner, but only if the entry still names the owner the
  /// decision was based on. The moment the lock is released with the new
  /// owner installed is the linearization point of a handoff.
  pub fn replace_if(&self, chunk_id: ChunkPos, expected: &str, new: &str) -> bool {
    let mut zone = self.zone.lock();
    match zone.get_mut(&chunk_id) {
      Some(owner) if owner == expected => {
        *owner = new.to_string();
        true
      }
      _ => false,
    }
  }

  pub fn len(&self) -> usize { self.zone.lock().len() }
  pub fn is_empty(&self) -> bool { self.zone.lock().is_empty() }
}

impl Default for Registry {
  fn default() -> Self { Self::new() }
}
