use crate::{math::ChunkPos, player::Player};
use serde::{Deserialize, Serialize};

/// A stacked voxel. The `(x, z)` pair names a column within the chunk;
/// `height` is the cube's slot in that column, counted from 0 at the ground.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Cube {
  pub cube_id: String,
  pub x:       i32,
  pub z:       i32,
  pub height:  i32,
  pub color:   String,
}

/// One 32x32 region of the world, with everything a server needs to serve it:
/// the cubes placed in it, the players standing in it, and the endpoint of the
/// server that currently owns it.
///
/// The dirty flag is set by every mutation and by ownership changes, and is
/// consumed by freshness-only reads (`READ_ONLY`).
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
  pub id:          ChunkPos,
  pub server_ip:   String,
  pub data:        String,
  pub player_list: Vec<Player>,
  pub is_dirty:    bool,
  pub cells:       Vec<Cube>,
}

impl Chunk {
  /// Creates an empty chunk owned by the given server.
  pub fn new(id: ChunkPos, server_ip: impl Into<String>) -> Self {
    Chunk {
      id,
      server_ip: server_ip.into(),
      data: String::new(),
      player_list: vec![],
      is_dirty: false,
      cells: vec![],
    }
  }

  /// The number of players currently standing in this chunk. This is the load
  /// metric the ownership tiebreak compares.
  pub fn player_count(&self) -> u32 { self.player_list.len() as u32 }

  /// The current height of the column at `(x, z)`, which is also the slot the
  /// next cube placed there will land in.
  pub fn column_height(&self, x: i32, z: i32) -> i32 {
    self.cells.iter().filter(|c| c.x == x && c.z == z).count() as i32
  }

  /// Places a cube on top of its column and returns the height it landed at.
  /// The height carried in the request is ignored; stacking is column-based,
  /// so heights within a column always form a dense `0..k` prefix.
  pub fn add_cube(&mut self, mut cube: Cube) -> i32 {
    let height = self.column_height(cube.x, cube.z);
    cube.height = height;
    self.cells.push(cube);
    self.is_dirty = true;
    height
  }

  /// Removes the cube with the given id, dropping every cube above it in the
  /// same column down a slot so the column stays dense. Returns false if no
  /// cube has that id.
  pub fn remove_cube(&mut self, cube_id: &str) -> bool {
    let idx = match self.cells.iter().position(|c| c.cube_id == cube_id) {
      Some(i) => i,
      None => return false,
    };
    let removed = self.cells.swap_remove(idx);
    for c in &mut self.cells {
      if c.x == removed.x && c.z == removed.z && c.height > removed.height {
        c.height -= 1;
      }
    }
    self.is_dirty = true;
    true
  }

  /// Adds the player to this chunk's list, or refreshes the stored copy if a
  /// player with the same id is already present.
  pub fn upsert_player(&mut self, player: Player) {
    match self.player_list.iter_mut().find(|p| p.id == player.id) {
      Some(p) => *p = player,
      None => self.player_list.push(player),
    }
    self.is_dirty = true;
  }

  /// Removes the player with the given id. Returns false if they were not in
  /// this chunk.
  pub fn remove_player(&mut self, id: &str) -> bool {
    let idx = match self.player_list.iter().position(|p| p.id == id) {
      Some(i) => i,
      None => return false,
    };
    self.player_list.swap_remove(idx);
    self.is_dirty = true;
    true
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use pretty_assertions::assert_eq;

  fn cube(id: &str, x: i32, z: i32) -> Cube {
    Cube { cube_id: id.into(), x, z, height: 0, color: "#ff0000".into() }
  }

  #[test]
  fn cubes_stack_per_column() {
    let mut c = Chunk::new(ChunkPos::new(0, 0), "a:9000");
    assert_eq!(c.add_cube(cube("k1", 3, 5)), 0);
    assert_eq!(c.add_cube(cube("k2", 3, 5)), 1);
    assert_eq!(c.add_cube(cube("k3", 3, 5)), 2);
    // A different column starts at the ground again.
    assert_eq!(c.add_cube(cube("k4", 4, 5)), 0);
    assert!(c.is_dirty);

    // The request's height is ignored in favor of the column top.
    let mut lying = cube("k5", 4, 5);
    lying.height = 17;
    assert_eq!(c.add_cube(lying), 1);
  }

  #[test]
  fn remove_keeps_columns_dense() {
    let mut c = Chunk::new(ChunkPos::new(0, 0), "a:9000");
    for id in ["k1", "k2", "k3"] {
      c.add_cube(cube(id, 3, 5));
    }
    c.add_cube(cube("other", 9, 9));

    assert!(c.remove_cube("k2"));
    assert!(!c.remove_cube("k2"));
    assert!(c.cells.iter().all(|c| c.cube_id != "k2"));

    // Heights in the column must still be 0..k.
    let mut heights: Vec<i32> =
      c.cells.iter().filter(|c| c.x == 3 && c.z == 5).map(|c| c.height).collect();
    heights.sort_unstable();
    assert_eq!(heights, vec![0, 1]);
    // The untouched column is unaffected.
    assert_eq!(c.column_height(9, 9), 1);
  }

  #[test]
  fn players_are_deduped_by_id() {
    let mut c = Chunk::new(ChunkPos::new(0, 0), "a:9000");
    c.upsert_player(Player::new("p1", 1, 1));
    c.upsert_player(Player::new("p2", 2, 2));
    c.upsert_player(Player::new("p1", 8, 8));
    assert_eq!(c.player_count(), 2);
    assert_eq!(c.player_list.iter().find(|p| p.id == "p1").unwrap().pos_x, 8);

    assert!(c.remove_player("p1"));
    assert!(!c.remove_player("p1"));
    assert_eq!(c.player_count(), 1);
  }
}
