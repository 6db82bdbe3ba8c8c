use super::{route, Central};
use pretty_assertions::assert_eq;
use qr_common::{
  chunk::{Chunk, Cube},
  math::ChunkPos,
  net::{self, Request, Response, MAX_PACKET},
};
use std::{net::UdpSocket, thread, time::Duration};
use tiny_http::Method;

fn central(members: &[&str]) -> Central {
  Central::new(members.iter().map(|m| m.to_string()).collect())
}

/// A game server that answers one `FROM_CENTRAL` with a canned reply, and
/// hands back the request it saw.
fn stub_owner(reply: Response) -> (String, thread::JoinHandle<Request>) {
  let socket = UdpSocket::bind("127.0.0.1:0").unwrap();
  socket.set_read_timeout(Some(Duration::from_secs(10))).unwrap();
  let addr = socket.local_addr().unwrap().to_string();
  let handle = thread::spawn(move || {
    let mut buf = vec![0; MAX_PACKET];
    let (len, src) = socket.recv_from(&mut buf).unwrap();
    let req = net::decode_request(&buf[..len]).unwrap();
    socket.send_to(&net::encode(&reply).unwrap(), src).unwrap();
    req
  });
  (addr, handle)
}

/// An owner that never answers.
fn dead_owner() -> (String, UdpSocket) {
  let socket = UdpSocket::bind("127.0.0.1:0").unwrap();
  let addr = socket.local_addr().unwrap().to_string();
  (addr, socket)
}

#[test]
fn join_is_stable_and_in_range() {
  let c = central(&["a:9000", "b:9000", "c:9000"]);
  for id in ["p1", "p2", "alice", "bob", "somebody-with-a-long-name"] {
    let first = c.assign(id).to_string();
    // Replaying the join always lands on the same server.
    for _ in 0..8 {
      assert_eq!(c.assign(id), first);
    }
    assert!(["a:9000", "b:9000", "c:9000"].contains(&first.as_str()));
  }
}

#[test]
fn join_spreads_players() {
  let c = central(&["a:9000", "b:9000", "c:9000", "d:9000"]);
  let mut hit = std::collections::HashSet::new();
  for i in 0..256 {
    hit.insert(c.assign(&format!("player-{i}")).to_string());
  }
  // A stable hash over 256 ids should reach every member.
  assert_eq!(hit.len(), 4);
}

#[test]
fn first_contact_records_the_caller() {
  let c = central(&["a:9000", "b:9000"]);
  let pos = ChunkPos::new(10, 10);
  let resp = c.peer_chunk(pos, "b:9000".into(), 0);
  // success=false signals "no prior owner; you are now it".
  assert!(!resp.success);
  assert_eq!(resp.message.as_deref(), Some("b:9000"));
  assert_eq!(c.registry().get(pos), Some("b:9000".into()));
}

#[test]
fn replayed_lookup_from_the_owner_is_a_no_op() {
  let c = central(&["a:9000", "b:9000"]);
  let pos = ChunkPos::new(0, 0);
  c.peer_chunk(pos, "a:9000".into(), 0);

  let resp = c.peer_chunk(pos, "a:9000".into(), 3);
  assert!(resp.success);
  assert_eq!(resp.message.as_deref(), Some("a:9000"));
  assert_eq!(c.registry().get(pos), Some("a:9000".into()));
}

#[test]
fn owner_with_more_players_keeps_the_chunk() {
  let (owner, seen) = stub_owner(Response {
    success: true,
    player_count: Some(1),
    chunk: Some(Chunk::new(ChunkPos::new(0, 0), "unused")),
    ..Default::default()
  });
  let c = central(&["a:9000", "b:9000"]);
  let pos = ChunkPos::new(0, 0);
  c.registry().install_if_absent(pos, &owner);

  // An empty-handed caller never takes a chunk from a live owner.
  let resp = c.peer_chunk(pos, "b:9000".into(), 0);
  assert!(resp.success);
  assert_eq!(resp.message, Some(owner.clone()));
  assert!(resp.new_ip.is_none());
  assert!(resp.chunk.is_some());
  assert_eq!(c.registry().get(pos), Some(owner));

  match seen.join().unwrap() {
    Request::FromCentral { chunk_id, caller_ip, player_count } => {
      assert_eq!(chunk_id, pos);
      assert_eq!(caller_ip, "b:9000");
      assert_eq!(player_count, 0);
    }
    other => panic!("expected FROM_CENTRAL, got {other:?}"),
  }
}

#[test]
fn equal_load_keeps_the_current_owner() {
  let (owner, _seen) = stub_owner(Response {
    success: true,
    player_count: Some(2),
    ..Default::default()
  });
  let c = central(&["a:9000", "b:9000"]);
  let pos = ChunkPos::new(5, 5);
  c.registry().install_if_absent(pos, &owner);

  let resp = c.peer_chunk(pos, "b:9000".into(), 2);
  assert!(resp.success);
  assert_eq!(resp.message, Some(owner.clone()));
  assert_eq!(c.registry().get(pos), Some(owner));
}

#[test]
fn busier_caller_takes_the_chunk() {
  let mut transferred = Chunk::new(ChunkPos::new(0, 0), "b:9000");
  transferred.add_cube(Cube {
    cube_id: "k1".into(),
    x:       3,
    z:       5,
    height:  0,
    color:   "#ff0000".into(),
  });
  let (owner, _seen) = stub_owner(Response {
    success: true,
    player_count: Some(0),
    chunk: Some(transferred),
    ..Default::default()
  });
  let c = central(&["a:9000", "b:9000"]);
  let pos = ChunkPos::new(0, 0);
  c.registry().install_if_absent(pos, &owner);

  let resp = c.peer_chunk(pos, "b:9000".into(), 2);
  assert!(resp.success);
  assert_eq!(resp.message.as_deref(), Some("b:9000"));
  assert_eq!(resp.new_ip.as_deref(), Some("b:9000"));
  // The yielded state rides along for the new owner.
  assert_eq!(resp.chunk.unwrap().cells.len(), 1);
  assert_eq!(c.registry().get(pos), Some("b:9000".into()));
  assert_eq!(c.degraded_count(), 0);
}

#[test]
fn unreachable_owner_triggers_the_degraded_tiebreak() {
  let (owner, _socket) = dead_owner();
  let mut c = central(&["a:9000", "b:9000"]);
  c.set_peer_timeout(Duration::from_millis(150));
  let pos = ChunkPos::new(0, 0);
  c.registry().install_if_absent(pos, &owner);

  // A caller with players wins the chunk without the owner's consent.
  let resp = c.peer_chunk(pos, "b:9000".into(), 2);
  assert!(resp.success);
  assert_eq!(resp.message.as_deref(), Some("b:9000"));
  assert_eq!(c.registry().get(pos), Some("b:9000".into()));
  assert_eq!(c.degraded_count(), 1);

  // An empty-handed caller does not; the silent owner keeps the entry.
  let pos = ChunkPos::new(1, 1);
  c.registry().install_if_absent(pos, &owner);
  let resp = c.peer_chunk(pos, "b:9000".into(), 0);
  assert!(resp.success);
  assert_eq!(resp.message, Some(owner.clone()));
  assert_eq!(c.registry().get(pos), Some(owner));
  assert_eq!(c.degraded_count(), 2);
}

#[test]
fn routes() {
  let c = central(&["a:9000"]);

  let (status, resp) = route(&c, &Method::Post, "/join", r#"{"player_id":"p1"}"#);
  assert_eq!(status, 200);
  assert!(resp.success);
  assert_eq!(resp.message.as_deref(), Some("a:9000"));

  let (status, resp) = route(
    &c,
    &Method::Post,
    "/chunk",
    r#"{"type":"PEER_CHUNK","chunk_id":{"idx":0,"idy":0},"caller_ip":"a:9000","player_count":0}"#,
  );
  assert_eq!(status, 200);
  assert!(!resp.success);
  assert_eq!(resp.message.as_deref(), Some("a:9000"));

  let (status, _) = route(&c, &Method::Post, "/join", "not json");
  assert_eq!(status, 400);
  let (status, _) = route(&c, &Method::Post, "/chunk", r#"{"type":"NOPE"}"#);
  assert_eq!(status, 400);
  let (status, _) = route(&c, &Method::Get, "/join", "");
  assert_eq!(status, 404);
  let (status, _) = route(&c, &Method::Post, "/nope", "");
  assert_eq!(status, 404);
}
