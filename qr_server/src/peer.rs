use qr_common::{
  chunk::Chunk,
  math::ChunkPos,
  net::{self, Request, WireError},
};
use std::time::Duration;

/// How long a handoff waits for the receiving server to ack a `MERGE`.
pub const MERGE_TIMEOUT: Duration = Duration::from_secs(2);

/// Pushes chunk state to another server and waits for the ack. A lost ack is
/// not fatal to a handoff: the canonical ownership bit lives on the central,
/// and the receiver converges on its next lookup.
pub fn send_merge(
  addr: &str,
  chunk_id: ChunkPos,
  chunk: Chunk,
  timeout: Duration,
) -> Result<(), WireError> {
  let reply = net::exchange(addr, &Request::Merge { chunk_id, chunk }, timeout)?;
  if !reply.success {
    warn!("{addr} rejected merge for {chunk_id}: {:?}", reply.message);
  }
  Ok(())
}
