#[macro_use]
extern crate log;

use clap::Parser;
use qr_central::Central;
use std::{env, process, sync::Arc};

#[derive(Parser, Debug)]
#[clap(about, version, author)]
struct Args {
  /// Writes the default config to `central-default.toml`. Does not overwrite
  /// the existing config.
  #[clap(long)]
  write_default_config: bool,
}

fn main() {
  let args = Args::parse();
  let config = if args.write_default_config {
    qr_central::load_config_write_default("central.toml", "central-default.toml")
  } else {
    qr_central::load_config("central.toml")
  };

  let level = config.get("log-level");
  qr_common::init_with_level("central", level);

  // The membership list is static; the environment wins over the file so a
  // deployment can inject it without editing configs.
  let members: Vec<String> = match env::var("QR_SERVERS") {
    Ok(v) => v.split(',').map(|s| s.trim().to_string()).filter(|s| !s.is_empty()).collect(),
    Err(_) => config.get("servers"),
  };
  if members.is_empty() {
    error!("no game servers configured; set `servers` in central.toml or QR_SERVERS");
    process::exit(1);
  }

  let addr: String = config.get("address");
  let server = match tiny_http::Server::http(&*addr) {
    Ok(s) => s,
    Err(e) => {
      error!("couldn't bind to {addr}: {e}");
      process::exit(1);
    }
  };

  info!("central listening on {addr}, {} game servers", members.len());
  qr_central::run(Arc::new(Central::new(members)), server);
}
