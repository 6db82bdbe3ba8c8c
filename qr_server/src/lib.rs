#[macro_use]
extern crate log;

pub mod central;
pub mod net;
pub mod peer;
pub mod world;
