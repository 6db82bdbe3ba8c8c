use serde::{Deserialize, Serialize};
use std::{
  fmt,
  ops::{Add, AddAssign, Sub, SubAssign},
};

/// The side length of a chunk, in world cells.
pub const CHUNK_SIZE: i32 = 32;

/// The key of a chunk in the world. Two positions within the same 32x32
/// square map to the same `ChunkPos`.
///
/// On the wire this is the `{"idx": .., "idy": ..}` object carried in every
/// chunk-addressed request.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Hash, PartialEq, Eq)]
pub struct ChunkPos {
  #[serde(rename = "idx")]
  x: i32,
  #[serde(rename = "idy")]
  y: i32,
}

impl Default for ChunkPos {
  fn default() -> Self { ChunkPos::new(0, 0) }
}

impl fmt::Display for ChunkPos {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    write!(f, "ChunkPos({} {})", self.x, self.y)
  }
}

impl ChunkPos {
  /// Creates a chunk position from already-normalized chunk coordinates.
  pub const fn new(x: i32, y: i32) -> Self { ChunkPos { x, y } }
  /// Returns the chunk containing the given world position. This is a floor
  /// division, so negative positions land in the correct chunk.
  pub const fn of_world(x: i32, y: i32) -> Self {
    ChunkPos { x: x.div_euclid(CHUNK_SIZE), y: y.div_euclid(CHUNK_SIZE) }
  }
  /// Returns the X value of the position.
  #[inline(always)]
  pub const fn x(&self) -> i32 { self.x }
  /// Returns the Y value of the position.
  #[inline(always)]
  pub const fn y(&self) -> i32 { self.y }
  /// Returns the minimum world X value of the chunk.
  #[inline(always)]
  pub const fn world_x(&self) -> i32 { self.x * CHUNK_SIZE }
  /// Returns the minimum world Y value of the chunk.
  #[inline(always)]
  pub const fn world_y(&self) -> i32 { self.y * CHUNK_SIZE }

  /// Returns self, with x set to self.x plus the given value.
  #[inline(always)]
  #[must_use = "add_x returns a modified version of self"]
  pub fn add_x(mut self, x: i32) -> Self {
    self.x += x;
    self
  }
  /// Returns self, with y set to self.y plus the given value.
  #[inline(always)]
  #[must_use = "add_y returns a modified version of self"]
  pub fn add_y(mut self, y: i32) -> Self {
    self.y += y;
    self
  }
}

impl Add for ChunkPos {
  type Output = Self;
  fn add(self, other: Self) -> Self { Self { x: self.x + other.x, y: self.y + other.y } }
}

impl AddAssign for ChunkPos {
  fn add_assign(&mut self, other: Self) {
    self.x += other.x;
    self.y += other.y;
  }
}

impl Sub for ChunkPos {
  type Output = Self;
  fn sub(self, other: Self) -> Self { Self { x: self.x - other.x, y: self.y - other.y } }
}

impl SubAssign for ChunkPos {
  fn sub_assign(&mut self, other: Self) {
    self.x -= other.x;
    self.y -= other.y;
  }
}
