use crate::world::WorldManager;
use qr_common::net::{Request, Response};

/// Dispatches one decoded request to the chunk store. Which fields of the
/// reply envelope are set depends on the request type; see
/// [`Request`](qr_common::net::Request).
pub fn handle(wm: &WorldManager, req: Request) -> Response {
  match req {
    Request::GetData { chunk_id, player } => wm.get_data(chunk_id, player),
    Request::MovePlayer { chunk_id, player } => wm.move_player(chunk_id, player),
    Request::GetUpdates { chunk_id, player: _ } => wm.get_updates(chunk_id),
    Request::DeletePlayer { player } => wm.delete_player(&player),
    Request::AddCube { chunk_id, cube } => wm.add_cube(chunk_id, cube),
    Request::DeleteCube { chunk_id, cube_id } => wm.delete_cube(chunk_id, &cube_id),
    Request::Merge { chunk_id, chunk } => wm.merge(chunk_id, chunk),
    Request::ReadOnly { chunk_id, is_chunk_new } => wm.read_only(chunk_id, is_chunk_new),
    Request::FromCentral { chunk_id, caller_ip, player_count } => {
      wm.from_central(chunk_id, caller_ip, player_count)
    }
  }
}
