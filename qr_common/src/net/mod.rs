//! The JSON wire protocol spoken between the gateway, the game servers, and
//! the central coordinator.
//!
//! Every UDP datagram is a single JSON object. Requests carry a `type`
//! discriminator; replies are always the flat [`Response`] envelope. The same
//! envelope comes back from the central's HTTP surface, so one decoder covers
//! both transports.

use crate::{
  chunk::{Chunk, Cube},
  math::ChunkPos,
  player::Player,
};
use serde::{Deserialize, Serialize};
use std::{io, net::UdpSocket, time::Duration};
use thiserror::Error;

/// The largest datagram we will encode or accept. Anything bigger is rejected
/// rather than fragmented.
pub const MAX_PACKET: usize = 64 * 1024;

/// How many redirect hops a client will follow before giving up.
pub const MAX_REDIRECTS: usize = 3;

/// A request to a game server.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type")]
pub enum Request {
  /// Fetch a chunk and register the player in it. This is the request that
  /// drives the ownership protocol: a server receiving it for a chunk it does
  /// not own consults the central.
  #[serde(rename = "GET_DATA")]
  GetData { chunk_id: ChunkPos, player: Player },
  /// Update a player's position. Trusted to be routed by the gateway, so
  /// there is no ownership check.
  #[serde(rename = "MOVE_PLAYER")]
  MovePlayer { chunk_id: ChunkPos, player: Player },
  /// Read the current state of a chunk the player is standing in.
  #[serde(rename = "GET_UPDATES")]
  GetUpdates { chunk_id: ChunkPos, player: Player },
  /// Remove a player that disconnected.
  #[serde(rename = "DLT_PLAYER")]
  DeletePlayer { player: Player },
  /// Place a cube in a chunk.
  #[serde(rename = "ADD_CUBE")]
  AddCube { chunk_id: ChunkPos, cube: Cube },
  /// Remove a cube from a chunk.
  #[serde(rename = "DLT_CUBE")]
  DeleteCube { chunk_id: ChunkPos, cube_id: String },
  /// One-shot state transfer from another server: install the chunk if we
  /// don't hold it, append its players if we do.
  #[serde(rename = "MERGE")]
  Merge { chunk_id: ChunkPos, chunk: Chunk },
  /// Freshness-only read from a peer. The reply carries the chunk only if it
  /// changed since the last clean snapshot.
  #[serde(rename = "READ_ONLY")]
  ReadOnly { chunk_id: ChunkPos, is_chunk_new: bool },
  /// The central asking the owner of a chunk whether it will yield to a
  /// busier caller.
  #[serde(rename = "FROM_CENTRAL")]
  FromCentral { chunk_id: ChunkPos, caller_ip: String, player_count: u32 },
}

impl Request {
  const KNOWN_TYPES: [&'static str; 9] = [
    "GET_DATA",
    "MOVE_PLAYER",
    "GET_UPDATES",
    "DLT_PLAYER",
    "ADD_CUBE",
    "DLT_CUBE",
    "MERGE",
    "READ_ONLY",
    "FROM_CENTRAL",
  ];
}

/// The reply envelope. Every field except `success` is optional; which ones
/// are set depends on the request type.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct Response {
  pub success:      bool,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub message:      Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub chunk:        Option<Chunk>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub game_data:    Option<GameData>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub player_count: Option<u32>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub new_ip:       Option<String>,
}

impl Response {
  /// A bare success reply.
  pub fn ok() -> Self { Response { success: true, ..Default::default() } }
  /// A failure reply with a human-readable message.
  pub fn error(message: impl Into<String>) -> Self {
    Response { success: false, message: Some(message.into()), ..Default::default() }
  }
}

/// The per-tick world snapshot returned by `GET_UPDATES`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct GameData {
  pub chunk: Chunk,
}

/// The body of `POST /join` on the central.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct JoinRequest {
  pub player_id: String,
}

/// A request to the central's HTTP surface.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type")]
pub enum CentralRequest {
  /// A game server reporting traffic for a chunk it does not own.
  #[serde(rename = "PEER_CHUNK")]
  PeerChunk { chunk_id: ChunkPos, caller_ip: String, player_count: u32 },
}

#[derive(Error, Debug)]
pub enum WireError {
  #[error("malformed payload: {0}")]
  Json(#[from] serde_json::Error),
  #[error("payload has no `type` field")]
  MissingType,
  #[error("unknown request type `{0}`")]
  UnknownType(String),
  #[error("payload is {0} bytes, larger than the 64 KiB datagram limit")]
  TooLarge(usize),
  #[error("{0}")]
  Io(#[from] io::Error),
  #[error("no reply from {0}")]
  Timeout(String),
  #[error("no owner found within the redirect limit")]
  TooManyRedirects,
}

/// Encodes a message, rejecting anything that would not fit in a datagram.
pub fn encode(msg: &impl Serialize) -> Result<Vec<u8>, WireError> {
  let buf = serde_json::to_vec(msg)?;
  if buf.len() > MAX_PACKET {
    return Err(WireError::TooLarge(buf.len()));
  }
  Ok(buf)
}

/// Decodes a request, distinguishing an unknown `type` from a malformed
/// payload so the handler can reply "Unknown request type".
pub fn decode_request(buf: &[u8]) -> Result<Request, WireError> {
  let value: serde_json::Value = serde_json::from_slice(buf)?;
  let ty = match value.get("type").and_then(|t| t.as_str()) {
    Some(t) => t.to_string(),
    None => return Err(WireError::MissingType),
  };
  if !Request::KNOWN_TYPES.contains(&ty.as_str()) {
    return Err(WireError::UnknownType(ty));
  }
  Ok(serde_json::from_value(value)?)
}

pub fn decode_response(buf: &[u8]) -> Result<Response, WireError> {
  Ok(serde_json::from_slice(buf)?)
}

/// Sends one request to a peer over UDP and waits for the reply. The deadline
/// is hard: a dropped datagram in either direction surfaces as
/// [`WireError::Timeout`].
pub fn exchange(addr: &str, req: &Request, timeout: Duration) -> Result<Response, WireError> {
  let payload = encode(req)?;
  let socket = UdpSocket::bind("0.0.0.0:0")?;
  socket.set_read_timeout(Some(timeout))?;
  socket.send_to(&payload, addr)?;

  let mut buf = vec![0; MAX_PACKET];
  match socket.recv(&mut buf) {
    Ok(n) => decode_response(&buf[..n]),
    Err(e) if e.kind() == io::ErrorKind::WouldBlock || e.kind() == io::ErrorKind::TimedOut => {
      Err(WireError::Timeout(addr.into()))
    }
    Err(e) => Err(e.into()),
  }
}

/// Re-issues a logical request while the replies redirect to another server.
///
/// A reply `success=true, message=X` where `X` is not the endpoint we just
/// asked means the chunk lives on `X`; the request is re-issued there. The
/// chain is bounded, and redirects are request-scoped: nothing outside the
/// `send` closure is mutated. Returns the endpoint that finally answered
/// along with its reply.
pub fn follow_redirects<F>(addr: &str, mut send: F) -> Result<(String, Response), WireError>
where
  F: FnMut(&str) -> Result<Response, WireError>,
{
  let mut addr = addr.to_string();
  for _ in 0..=MAX_REDIRECTS {
    let resp = send(&addr)?;
    match &resp.message {
      Some(owner) if resp.success && *owner != addr => addr = owner.clone(),
      _ => return Ok((addr, resp)),
    }
  }
  Err(WireError::TooManyRedirects)
}

#[cfg(test)]
mod tests {
  use super::*;
  use pretty_assertions::assert_eq;

  fn sample_player() -> Player {
    let mut p = Player::new("p1", 40, -3);
    p.server_ip = "a:9000".into();
    p
  }

  fn sample_chunk() -> Chunk {
    let mut c = Chunk::new(ChunkPos::new(1, -1), "a:9000");
    c.data = "new chunk".into();
    c.upsert_player(sample_player());
    c.add_cube(Cube { cube_id: "k1".into(), x: 3, z: 5, height: 0, color: "#ff0000".into() });
    c
  }

  #[test]
  fn request_round_trip() {
    let requests = vec![
      Request::GetData { chunk_id: ChunkPos::new(0, 0), player: sample_player() },
      Request::MovePlayer { chunk_id: ChunkPos::new(1, 2), player: sample_player() },
      Request::GetUpdates { chunk_id: ChunkPos::new(1, 2), player: sample_player() },
      Request::DeletePlayer { player: sample_player() },
      Request::AddCube {
        chunk_id: ChunkPos::new(0, 0),
        cube:     Cube { cube_id: "k1".into(), x: 3, z: 5, height: 0, color: "#ff0000".into() },
      },
      Request::DeleteCube { chunk_id: ChunkPos::new(0, 0), cube_id: "k1".into() },
      Request::Merge { chunk_id: ChunkPos::new(1, -1), chunk: sample_chunk() },
      Request::ReadOnly { chunk_id: ChunkPos::new(0, 0), is_chunk_new: true },
      Request::FromCentral {
        chunk_id:     ChunkPos::new(0, 0),
        caller_ip:    "b:9000".into(),
        player_count: 2,
      },
    ];
    for req in requests {
      let buf = encode(&req).unwrap();
      assert_eq!(decode_request(&buf).unwrap(), req);
    }
  }

  #[test]
  fn response_round_trip() {
    let resp = Response {
      success:      true,
      message:      Some("a:9000".into()),
      chunk:        Some(sample_chunk()),
      game_data:    Some(GameData { chunk: sample_chunk() }),
      player_count: Some(1),
      new_ip:       Some("b:9000".into()),
    };
    let buf = encode(&resp).unwrap();
    assert_eq!(decode_response(&buf).unwrap(), resp);

    let bare = Response::ok();
    let buf = encode(&bare).unwrap();
    // Unset fields are skipped entirely on the wire.
    assert_eq!(serde_json::from_slice::<serde_json::Value>(&buf).unwrap(), serde_json::json!({
      "success": true
    }));
    assert_eq!(decode_response(&buf).unwrap(), bare);
  }

  #[test]
  fn wire_type_names() {
    let buf =
      encode(&Request::ReadOnly { chunk_id: ChunkPos::new(0, 0), is_chunk_new: false }).unwrap();
    let v: serde_json::Value = serde_json::from_slice(&buf).unwrap();
    assert_eq!(v["type"], "READ_ONLY");

    let buf = encode(&CentralRequest::PeerChunk {
      chunk_id:     ChunkPos::new(0, 0),
      caller_ip:    "a:9000".into(),
      player_count: 0,
    })
    .unwrap();
    let v: serde_json::Value = serde_json::from_slice(&buf).unwrap();
    assert_eq!(v["type"], "PEER_CHUNK");
  }

  #[test]
  fn unknown_and_malformed_requests() {
    match decode_request(br#"{"type":"EXPLODE_CHUNK"}"#) {
      Err(WireError::UnknownType(ty)) => assert_eq!(ty, "EXPLODE_CHUNK"),
      other => panic!("expected unknown type, got {other:?}"),
    }
    assert!(matches!(decode_request(br#"{"chunk_id":{"idx":0,"idy":0}}"#), Err(WireError::MissingType)));
    assert!(matches!(decode_request(b"not json"), Err(WireError::Json(_))));
    // Known type but missing fields is a decode error, not an unknown type.
    assert!(matches!(decode_request(br#"{"type":"GET_DATA"}"#), Err(WireError::Json(_))));
  }

  #[test]
  fn oversized_payloads_are_rejected() {
    let mut chunk = sample_chunk();
    chunk.data = "x".repeat(MAX_PACKET);
    match encode(&Request::Merge { chunk_id: chunk.id, chunk }) {
      Err(WireError::TooLarge(n)) => assert!(n > MAX_PACKET),
      other => panic!("expected TooLarge, got {other:?}"),
    }
  }

  #[test]
  fn redirects_converge_and_are_bounded() {
    // One hop: a -> b, then b answers for itself.
    let mut calls = vec![];
    let (addr, resp) = follow_redirects("a:9000", |addr| {
      calls.push(addr.to_string());
      Ok(match addr {
        "a:9000" => Response { message: Some("b:9000".into()), ..Response::ok() },
        _ => Response { message: Some("b:9000".into()), chunk: None, ..Response::ok() },
      })
    })
    .unwrap();
    assert_eq!(addr, "b:9000");
    assert!(resp.success);
    assert_eq!(calls, vec!["a:9000", "b:9000"]);

    // Failures are returned to the caller, not retried.
    let (addr, resp) =
      follow_redirects("a:9000", |_| Ok(Response::error("Failed to reach central"))).unwrap();
    assert_eq!(addr, "a:9000");
    assert!(!resp.success);

    // A chain that never settles is cut off.
    let mut n = 0;
    let err = follow_redirects("s0", |_| {
      n += 1;
      Ok(Response { message: Some(format!("s{n}")), ..Response::ok() })
    })
    .unwrap_err();
    assert!(matches!(err, WireError::TooManyRedirects));
    assert_eq!(n, MAX_REDIRECTS + 1);
  }
}
