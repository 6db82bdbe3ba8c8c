//! The central coordinator.
//!
//! The central owns two things: the player -> server assignment handed out on
//! `/join`, and the chunk -> owner [`Registry`] consulted and rewritten on
//! `/chunk`. It serves both over HTTP, and reaches out to game servers over
//! UDP when a miss forces an ownership decision.

#[macro_use]
extern crate log;

pub mod registry;

pub use registry::Registry;

use qr_common::{
  config::Config,
  math::ChunkPos,
  net::{self, CentralRequest, JoinRequest, Request, Response},
  util::ThreadPool,
};
use std::{
  io::Read,
  sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
  },
  time::Duration,
};
use tiny_http::Method;

/// How long the central waits for an owner to answer `FROM_CENTRAL` before it
/// falls back to the degraded tiebreak.
pub const PEER_TIMEOUT: Duration = Duration::from_secs(3);

/// Loads the config at the given path, using the compiled-in default config.
pub fn load_config(path: &str) -> Config { Config::new(path, include_str!("default.toml")) }
/// Loads the config at the given path, using the compiled-in default config.
/// This will then write the default config to the `default` path provided.
pub fn load_config_write_default(path: &str, default: &str) -> Config {
  Config::new_write_default(path, default, include_str!("default.toml"))
}

pub struct Central {
  registry:     Registry,
  members:      Vec<String>,
  peer_timeout: Duration,
  degraded:     AtomicU64,
}

impl Central {
  /// Creates a central for a static membership list of game servers.
  ///
  /// # Panics
  ///
  /// Panics if the membership list is empty, as there would be nowhere to
  /// assign players.
  pub fn new(members: Vec<String>) -> Self {
    if members.is_empty() {
      panic!("cannot run a central with no game servers");
    }
    Central {
      registry: Registry::new(),
      members,
      peer_timeout: PEER_TIMEOUT,
      degraded: AtomicU64::new(0),
    }
  }

  /// Overrides the `FROM_CENTRAL` reply deadline.
  pub fn set_peer_timeout(&mut self, timeout: Duration) { self.peer_timeout = timeout; }

  pub fn registry(&self) -> &Registry { &self.registry }

  /// How many ownership decisions were taken without hearing from the owner.
  /// Each one is a window in which two servers may briefly both consider
  /// themselves owner.
  pub fn degraded_count(&self) -> u64 { self.degraded.load(Ordering::Relaxed) }

  /// Serves `/join`: a stable hash of the player id over the membership
  /// list, so the same player lands on the same server as long as the
  /// membership is unchanged. No state is recorded.
  pub fn assign(&self, player_id: &str) -> &str {
    let idx = wyhash::wyhash(player_id.as_bytes(), 0) as usize % self.members.len();
    &self.members[idx]
  }

  /// Serves `/chunk`: a game server reporting traffic for a chunk it does
  /// not own. Resolves who owns the chunk, mediating a handoff with the
  /// current owner if the caller is busier.
  ///
  /// The reply's `success` flag signals whether the chunk had a prior owner:
  /// `false` means first contact, and the registry now names the caller.
  pub fn peer_chunk(&self, chunk_id: ChunkPos, caller_ip: String, caller_count: u32) -> Response {
    let owner = match self.registry.install_if_absent(chunk_id, &caller_ip) {
      None => {
        info!("{chunk_id} first contact, owner is now {caller_ip}");
        return Response { success: false, message: Some(caller_ip), ..Default::default() };
      }
      Some(owner) => owner,
    };
    if owner == caller_ip {
      // A replayed lookup from the server the registry already names.
      return Response { success: true, message: Some(owner), ..Default::default() };
    }

    // The registry lock is not held across the exchange; the rewrite below
    // re-checks that the entry still names the owner we asked.
    let req = Request::FromCentral {
      chunk_id,
      caller_ip: caller_ip.clone(),
      player_count: caller_count,
    };
    match net::exchange(&owner, &req, self.peer_timeout) {
      Ok(reply) => {
        let owner_count = reply.player_count.unwrap_or(0);
        if owner_count < caller_count {
          if !self.registry.replace_if(chunk_id, &owner, &caller_ip) {
            warn!("{chunk_id} owner changed during the handoff, leaving the registry as is");
          }
          info!("{chunk_id} handed off {owner} -> {caller_ip} ({owner_count} < {caller_count} players)");
          Response {
            success: true,
            message: Some(caller_ip.clone()),
            new_ip: Some(caller_ip),
            chunk: reply.chunk,
            ..Default::default()
          }
        } else {
          Response { success: true, message: Some(owner), chunk: reply.chunk, ..Default::default() }
        }
      }
      Err(e) => {
        // Degraded tiebreak: the owner is unreachable. Handing the chunk to
        // a caller that has players trades safety for liveness; a long
        // partition can leave two self-declared owners until the old one
        // next checks in.
        self.degraded.fetch_add(1, Ordering::Relaxed);
        warn!("owner {owner} of {chunk_id} did not answer ({e}), using the degraded tiebreak");
        if caller_count > 0 {
          self.registry.replace_if(chunk_id, &owner, &caller_ip);
          Response {
            success: true,
            message: Some(caller_ip.clone()),
            new_ip: Some(caller_ip),
            ..Default::default()
          }
        } else {
          Response { success: true, message: Some(owner), ..Default::default() }
        }
      }
    }
  }
}

/// Serves the HTTP surface until the server is shut down. Requests are
/// handled on a worker pool; `peer_chunk` can block on a game server for the
/// full peer deadline, and one slow owner must not stall every other caller.
pub fn run(central: Arc<Central>, server: tiny_http::Server) {
  let pool = ThreadPool::auto("http handler", || central.clone());
  for req in server.incoming_requests() {
    pool.execute(move |c| handle_request(c, req));
  }
}

fn handle_request(central: &Arc<Central>, mut req: tiny_http::Request) {
  let mut body = String::new();
  let (status, resp) = match req.as_reader().read_to_string(&mut body) {
    Ok(_) => route(central, req.method(), req.url(), &body),
    Err(e) => (400, Response::error(format!("unreadable body: {e}"))),
  };
  respond(req, status, &resp);
}

/// Maps one HTTP request to a wire reply and a status code. Split from the
/// socket handling so it can be exercised directly.
pub fn route(central: &Central, method: &Method, url: &str, body: &str) -> (u16, Response) {
  if *method != Method::Post {
    return (404, Response::error("not found"));
  }
  match url {
    "/join" => match serde_json::from_str::<JoinRequest>(body) {
      Ok(join) => {
        let ip = central.assign(&join.player_id);
        debug!("assigned {} to {ip}", join.player_id);
        (200, Response { success: true, message: Some(ip.into()), ..Default::default() })
      }
      Err(e) => (400, Response::error(format!("invalid join request: {e}"))),
    },
    "/chunk" | "/peer_chunk" => match serde_json::from_str::<CentralRequest>(body) {
      Ok(CentralRequest::PeerChunk { chunk_id, caller_ip, player_count }) => {
        (200, central.peer_chunk(chunk_id, caller_ip, player_count))
      }
      Err(e) => (400, Response::error(format!("invalid chunk request: {e}"))),
    },
    _ => (404, Response::error("not found")),
  }
}

fn respond(req: tiny_http::Request, status: u16, resp: &Response) {
  let body = serde_json::to_string(resp).unwrap_or_else(|_| r#"{"success":false}"#.into());
  let mut http = tiny_http::Response::from_string(body).with_status_code(status);
  if let Ok(header) = tiny_http::Header::from_bytes(&b"Content-Type"[..], &b"application/json"[..])
  {
    http = http.with_header(header);
  }
  if let Err(e) = req.respond(http) {
    warn!("could not send reply: {e}");
  }
}

#[cfg(test)]
mod tests;
