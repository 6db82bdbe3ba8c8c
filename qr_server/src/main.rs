#[macro_use]
extern crate log;

use clap::Parser;
use qr_common::config::Config;
use qr_server::{central::CentralClient, net::ConnectionManager, world::WorldManager};
use std::{process, sync::Arc};

#[derive(Parser, Debug)]
#[clap(about, version, author)]
struct Args {
  /// Writes the default config to `server-default.toml`. Does not overwrite
  /// the existing config.
  #[clap(long)]
  write_default_config: bool,
}

fn main() {
  let args = Args::parse();
  let config = if args.write_default_config {
    Config::new_write_default("server.toml", "server-default.toml", include_str!("default.toml"))
  } else {
    Config::new("server.toml", include_str!("default.toml"))
  };

  let level = config.get("log-level");
  qr_common::init_with_level("server", level);

  let addr = match config.get::<_, String>("address").parse() {
    Ok(v) => v,
    Err(e) => {
      error!("invalid address: {e}");
      process::exit(1);
    }
  };

  let conn = match ConnectionManager::bind(addr) {
    Ok(c) => c,
    Err(e) => {
      error!("couldn't bind to {addr}: {e}");
      process::exit(1);
    }
  };

  let public: String = config.get("public-address");
  let public = if public.is_empty() {
    match conn.local_addr() {
      Ok(a) => a.to_string(),
      Err(e) => {
        error!("couldn't read the bound address: {e}");
        process::exit(1);
      }
    }
  } else {
    public
  };

  let central: String = config.get("central");
  let wm = Arc::new(WorldManager::new(public.clone(), CentralClient::new(central)));

  info!("listening on {addr}, advertising {public}");
  match conn.run(wm) {
    Ok(_) => {}
    Err(e) => {
      error!("error in connection: {e}");
      process::exit(1);
    }
  }
}
