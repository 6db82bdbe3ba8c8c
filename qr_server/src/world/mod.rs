//! The chunk store of a game server.
//!
//! [`WorldManager`] is the one global type on a server: it holds every chunk
//! the server owns (or has cached from a former ownership), the residence map
//! from player id to chunk, and the player records themselves. All three live
//! behind a single mutex; handlers copy what they need out of the lock before
//! doing any network call, and re-acquire it to install results.

use crate::{
  central::CentralClient,
  peer::{self, MERGE_TIMEOUT},
};
use parking_lot::Mutex;
use qr_common::{
  chunk::{Chunk, Cube},
  math::ChunkPos,
  net::{GameData, Response},
  player::Player,
};
use std::collections::HashMap;


pub struct WorldManager {
  self_addr: String,
  central:   CentralClient,
  state:     Mutex<WorldState>,
}

#[derive(Default)]
struct WorldState {
  /// Every chunk this server owns, plus stale copies of chunks it used to
  /// own. A copy is ours iff `chunk.server_ip` equals our own endpoint.
  zone_map:   HashMap<ChunkPos, Chunk>,
  /// Last-known residence per player id.
  players:    HashMap<String, ChunkPos>,
  /// The player records themselves, indexed by id. The copies embedded in
  /// chunks are values, not references; this map is the lookup side.
  player_map: HashMap<String, Player>,
}

impl WorldState {
  /// Accepts a player into the given chunk: residence map, player map, and
  /// the chunk's embedded list all get the new record. If the player was
  /// resident in another locally-held chunk, they are removed from it.
  fn register_player(&mut self, chunk_id: ChunkPos, mut player: Player, addr: &str) {
    player.server_ip = addr.into();
    player.chunk_id = chunk_id;
    if let Some(old) = self.players.insert(player.id.clone(), chunk_id) {
      if old != chunk_id {
        if let Some(c) = self.zone_map.get_mut(&old) {
          c.remove_player(&player.id);
        }
      }
    }
    self.player_map.insert(player.id.clone(), player.clone());
    if let Some(c) = self.zone_map.get_mut(&chunk_id) {
      c.upsert_player(player);
    }
  }

  /// Installs a chunk we just became responsible for, registering every
  /// player it carries.
  fn install_chunk(&mut self, mut chunk: Chunk, addr: &str) {
    let chunk_id = chunk.id;
    chunk.server_ip = addr.into();
    for p in &mut chunk.player_list {
      p.server_ip = addr.into();
      p.chunk_id = chunk_id;
      self.players.insert(p.id.clone(), chunk_id);
      self.player_map.insert(p.id.clone(), p.clone());
    }
    self.zone_map.insert(chunk_id, chunk);
  }
}

impl WorldManager {
  pub fn new(self_addr: String, central: CentralClient) -> Self {
    WorldManager { self_addr, central, state: Mutex::new(WorldState::default()) }
  }

  /// The endpoint this server advertises to clients, peers, and the central.
  pub fn self_addr(&self) -> &str { &self.self_addr }

  /// Serves `GET_DATA`: the welcome path if we own the chunk, otherwise the
  /// full miss protocol against the central.
  pub fn get_data(&self, chunk_id: ChunkPos, player: Player) -> Response {
    let player_count = {
      let mut s = self.state.lock();
      // None means the chunk is ours and the player is welcome right away.
      let cached_count = match s.zone_map.get(&chunk_id) {
        Some(c) if c.server_ip == self.self_addr => None,
        Some(c) => Some(c.player_count()),
        None => Some(0),
      };
      match cached_count {
        Some(n) => n,
        None => {
          s.register_player(chunk_id, player, &self.self_addr);
          return Response {
            success: true,
            chunk: s.zone_map.get(&chunk_id).cloned(),
            message: Some(self.self_addr.clone()),
            ..Default::default()
          };
        }
      }
    };

    // Not ours. Ask the central who owns it; this blocks for up to the
    // central deadline, with the store unlocked.
    let reply = match self.central.peer_chunk(chunk_id, &self.self_addr, player_count) {
      Ok(r) => r,
      Err(e) => {
        warn!("central lookup for {chunk_id} failed: {e}");
        return Response::error("Failed to reach central");
      }
    };

    if !reply.success {
      // First contact for this chunk anywhere. The registry now names us, and
      // there is no prior state to fetch.
      info!("creating {chunk_id}, first requested by {}", player.id);
      let mut chunk = Chunk::new(chunk_id, self.self_addr.clone());
      chunk.data = "new chunk".into();
      let mut s = self.state.lock();
      s.zone_map.insert(chunk_id, chunk);
      s.register_player(chunk_id, player, &self.self_addr);
      return Response {
        success: true,
        chunk: s.zone_map.get(&chunk_id).cloned(),
        message: Some(self.self_addr.clone()),
        ..Default::default()
      };
    }

    let owner = match reply.message.clone() {
      Some(o) => o,
      None => return Response::error("central reply carried no owner"),
    };

    if owner == self.self_addr {
      return self.adopt_chunk(chunk_id, player, reply.chunk);
    }

    // Someone else owns the chunk. Hand over whatever we hold (at minimum
    // the player that just asked), then redirect the client.
    let transfer = {
      let mut s = self.state.lock();
      match s.zone_map.get_mut(&chunk_id) {
        Some(c) => {
          // Ownership moved away from us; the copy stays as a read hint.
          c.server_ip = owner.clone();
          for p in &mut c.player_list {
            p.server_ip = owner.clone();
          }
          c.is_dirty = true;
          c.clone()
        }
        None => {
          let mut c = Chunk::new(chunk_id, owner.clone());
          let mut p = player.clone();
          p.server_ip = owner.clone();
          p.chunk_id = chunk_id;
          c.player_list.push(p);
          c
        }
      }
    };
    if let Err(e) = peer::send_merge(&owner, chunk_id, transfer, MERGE_TIMEOUT) {
      warn!("merge to {owner} for {chunk_id} failed: {e}");
    }
    Response { success: true, message: Some(owner), ..Default::default() }
  }

  /// The central decided this chunk lives here, either because we held a
  /// cached copy or because the previous owner just yielded to us.
  fn adopt_chunk(&self, chunk_id: ChunkPos, player: Player, body: Option<Chunk>) -> Response {
    let mut s = self.state.lock();
    if !s.zone_map.contains_key(&chunk_id) {
      match body {
        Some(mut c) => {
          c.id = chunk_id;
          c.is_dirty = true;
          s.install_chunk(c, &self.self_addr);
        }
        None => {
          let mut c = Chunk::new(chunk_id, self.self_addr.clone());
          c.data = "new chunk".into();
          s.zone_map.insert(chunk_id, c);
        }
      }
    } else if let Some(c) = s.zone_map.get_mut(&chunk_id) {
      c.server_ip = self.self_addr.clone();
      c.is_dirty = true;
    }
    s.register_player(chunk_id, player, &self.self_addr);
    Response {
      success: true,
      chunk: s.zone_map.get(&chunk_id).cloned(),
      message: Some(self.self_addr.clone()),
      ..Default::default()
    }
  }

  /// Serves `MOVE_PLAYER`. The chunk id is derived from the position, so a
  /// player record never disagrees with where it is standing. No ownership
  /// check: the gateway routes moves at the player's current server.
  pub fn move_player(&self, _chunk_id: ChunkPos, mut player: Player) -> Response {
    let chunk_id = ChunkPos::of_world(player.pos_x, player.pos_y);
    player.chunk_id = chunk_id;
    player.server_ip = self.self_addr.clone();
    let mut s = self.state.lock();
    if let Some(old) = s.players.insert(player.id.clone(), chunk_id) {
      if old != chunk_id {
        if let Some(c) = s.zone_map.get_mut(&old) {
          c.remove_player(&player.id);
        }
      }
    }
    if let Some(c) = s.zone_map.get_mut(&chunk_id) {
      c.upsert_player(player.clone());
    }
    s.player_map.insert(player.id.clone(), player);
    Response::ok()
  }

  /// Serves `GET_UPDATES`.
  pub fn get_updates(&self, chunk_id: ChunkPos) -> Response {
    let s = self.state.lock();
    match s.zone_map.get(&chunk_id) {
      Some(c) => Response {
        success: true,
        game_data: Some(GameData { chunk: c.clone() }),
        ..Default::default()
      },
      None => Response::error("no such chunk"),
    }
  }

  /// Serves `DLT_PLAYER`, pruning the player from every index. The embedded
  /// list matters most: it is the load metric the ownership tiebreak reads.
  pub fn delete_player(&self, player: &Player) -> Response {
    let mut s = self.state.lock();
    if let Some(chunk_id) = s.players.remove(&player.id) {
      if let Some(c) = s.zone_map.get_mut(&chunk_id) {
        c.remove_player(&player.id);
      }
    }
    s.player_map.remove(&player.id);
    Response::ok()
  }

  /// Serves `ADD_CUBE`.
  pub fn add_cube(&self, chunk_id: ChunkPos, cube: Cube) -> Response {
    let mut s = self.state.lock();
    match s.zone_map.get_mut(&chunk_id) {
      Some(c) => {
        c.add_cube(cube);
        Response::ok()
      }
      None => Response::error("no such chunk"),
    }
  }

  /// Serves `DLT_CUBE`.
  pub fn delete_cube(&self, chunk_id: ChunkPos, cube_id: &str) -> Response {
    let mut s = self.state.lock();
    match s.zone_map.get_mut(&chunk_id) {
      Some(c) => {
        if c.remove_cube(cube_id) {
          Response::ok()
        } else {
          Response::error("no such cube")
        }
      }
      None => Response::error("no such chunk"),
    }
  }

  /// Serves `MERGE`: install the chunk if we don't hold it, append its
  /// players (de-duplicated by id) if we do.
  pub fn merge(&self, chunk_id: ChunkPos, mut chunk: Chunk) -> Response {
    let mut s = self.state.lock();
    chunk.id = chunk_id;
    if s.zone_map.contains_key(&chunk_id) {
      for mut p in chunk.player_list {
        p.server_ip = self.self_addr.clone();
        p.chunk_id = chunk_id;
        s.players.insert(p.id.clone(), chunk_id);
        s.player_map.insert(p.id.clone(), p.clone());
        if let Some(c) = s.zone_map.get_mut(&chunk_id) {
          c.upsert_player(p);
        }
      }
    } else {
      s.install_chunk(chunk, &self.self_addr);
    }
    Response::ok()
  }

  /// Serves `READ_ONLY`, the freshness-only read peers use. Handing out the
  /// chunk consumes the dirty flag: the copy returned is the caller's new
  /// clean snapshot.
  pub fn read_only(&self, chunk_id: ChunkPos, is_chunk_new: bool) -> Response {
    let mut s = self.state.lock();
    match s.zone_map.get_mut(&chunk_id) {
      Some(c) if is_chunk_new || c.is_dirty || !c.player_list.is_empty() => {
        c.is_dirty = false;
        Response { success: true, chunk: Some(c.clone()), ..Default::default() }
      }
      Some(_) => Response::error("use cached copy"),
      None => Response::error("no such chunk"),
    }
  }

  /// Serves `FROM_CENTRAL`: the central asking whether we yield this chunk
  /// to a busier caller. Never fails; a chunk we don't hold counts as zero
  /// players, which yields. Ties keep the chunk here.
  pub fn from_central(&self, chunk_id: ChunkPos, caller_ip: String, caller_count: u32) -> Response {
    let (snapshot, my_count, transfer) = {
      let mut s = self.state.lock();
      let mut my_count = 0;
      let mut snapshot = None;
      let mut transfer = None;
      if let Some(c) = s.zone_map.get_mut(&chunk_id) {
        my_count = c.player_count();
        if my_count < caller_count {
          c.server_ip = caller_ip.clone();
          for p in &mut c.player_list {
            p.server_ip = caller_ip.clone();
          }
          c.is_dirty = true;
          transfer = Some(c.clone());
        }
        snapshot = Some(c.clone());
      }
      if let Some(t) = &transfer {
        for p in &t.player_list {
          if let Some(known) = s.player_map.get_mut(&p.id) {
            known.server_ip = caller_ip.clone();
          }
        }
      }
      (snapshot, my_count, transfer)
    };

    if let Some(chunk) = transfer {
      info!("yielding {chunk_id} to {caller_ip} ({my_count} < {caller_count} players)");
      if let Err(e) = peer::send_merge(&caller_ip, chunk_id, chunk, MERGE_TIMEOUT) {
        warn!("merge to {caller_ip} for {chunk_id} failed: {e}");
      }
    }
    Response {
      success: true,
      chunk: snapshot,
      player_count: Some(my_count),
      ..Default::default()
    }
  }
}
