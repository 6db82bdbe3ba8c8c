use crate::math::ChunkPos;
use serde::{Deserialize, Serialize};

/// A connected player. The authoritative copy lives on whichever server owns
/// the chunk the player is standing in; the copy embedded in a
/// [`Chunk`](crate::chunk::Chunk)'s player list is a value, not a reference.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Player {
  pub id:         String,
  pub pos_x:      i32,
  pub pos_y:      i32,
  /// The endpoint of the server this player is currently talking to. Rewritten
  /// during a handoff so the client can follow the chunk to its new owner.
  pub server_ip:  String,
  pub chunk_id:   ChunkPos,
  pub aoi_radius: i32,
}

impl Player {
  /// Creates a player standing at the given world position. The chunk id is
  /// derived from the position.
  pub fn new(id: impl Into<String>, pos_x: i32, pos_y: i32) -> Self {
    Player {
      id: id.into(),
      pos_x,
      pos_y,
      server_ip: String::new(),
      chunk_id: ChunkPos::of_world(pos_x, pos_y),
      aoi_radius: 1,
    }
  }

  /// Moves the player to the given world position, keeping the chunk id in
  /// sync.
  pub fn move_to(&mut self, pos_x: i32, pos_y: i32) {
    self.pos_x = pos_x;
    self.pos_y = pos_y;
    self.chunk_id = ChunkPos::of_world(pos_x, pos_y);
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn chunk_follows_position() {
    let mut p = Player::new("p1", 5, 5);
    assert_eq!(p.chunk_id, ChunkPos::new(0, 0));
    p.move_to(40, -1);
    assert_eq!(p.chunk_id, ChunkPos::new(1, -1));
  }
}
