use qr_common::{
  math::ChunkPos,
  net::{CentralRequest, Response},
};
use std::time::Duration;
use thiserror::Error;

/// How long we wait for the central to resolve a miss. The central may itself
/// be waiting on the current owner, so this is the longest deadline in the
/// system.
pub const CENTRAL_TIMEOUT: Duration = Duration::from_secs(3);

/// HTTP client for the central coordinator. One per server; the underlying
/// agent reuses connections.
pub struct CentralClient {
  base:  String,
  agent: ureq::Agent,
}

#[derive(Error, Debug)]
pub enum CentralError {
  #[error("{0}")]
  Http(Box<ureq::Error>),
  #[error("{0}")]
  Json(#[from] serde_json::Error),
  #[error("{0}")]
  IO(#[from] std::io::Error),
}

impl From<ureq::Error> for CentralError {
  fn from(e: ureq::Error) -> Self { CentralError::Http(Box::new(e)) }
}

impl CentralClient {
  /// Creates a client for the central at the given base URL, e.g.
  /// `http://127.0.0.1:8080`.
  pub fn new(base: impl Into<String>) -> Self {
    CentralClient {
      base:  base.into(),
      agent: ureq::AgentBuilder::new().timeout(CENTRAL_TIMEOUT).build(),
    }
  }

  /// Reports traffic for a chunk we don't own and returns the central's
  /// verdict. `success=false` in the reply means the chunk had no prior owner
  /// anywhere, and the registry now names us; otherwise `message` carries the
  /// endpoint that owns the chunk after arbitration.
  pub fn peer_chunk(
    &self,
    chunk_id: ChunkPos,
    caller_ip: &str,
    player_count: u32,
  ) -> Result<Response, CentralError> {
    let req =
      CentralRequest::PeerChunk { chunk_id, caller_ip: caller_ip.into(), player_count };
    let body = serde_json::to_string(&req)?;
    let resp = self
      .agent
      .post(&format!("{}/chunk", self.base))
      .set("Content-Type", "application/json")
      .send_string(&body)?;
    Ok(serde_json::from_reader(resp.into_reader())?)
  }
}
