//! Shared pieces of the quarry world: chunk math, the UDP wire protocol, the
//! chunk/cube/player data model, config loading, and the logger.

#[macro_use]
extern crate log;

pub mod chunk;
pub mod config;
pub mod math;
pub mod net;
pub mod player;
pub mod util;

use log::LevelFilter;
use std::io;

/// Initializes the logger at the default level. `name` is the process role
/// (`server`, `central`); a development cluster interleaves several processes
/// in one terminal, and every line carries the role it came from.
pub fn init(name: &str) { init_with_level(name, LevelFilter::Info) }

pub fn init_with_level(name: &str, level: LevelFilter) {
  init_with_level_writer(name, level, io::stdout());
}

pub fn init_with_level_writer<W: io::Write + Send + Sync + 'static>(
  name: &str,
  level: LevelFilter,
  writer: W,
) {
  use log::{Level, Metadata, Record};
  use parking_lot::Mutex;

  #[cfg(unix)]
  let color = unsafe { libc::isatty(libc::STDOUT_FILENO) } != 0;
  #[cfg(not(unix))]
  let color = false;

  fn level_tag(color: bool, level: Level) -> &'static str {
    if !color {
      return level.as_str();
    }
    match level {
      Level::Error => "\x1b[31m\x1b[1mERROR\x1b[0m",
      Level::Warn => "\x1b[33mWARN\x1b[0m",
      Level::Info => "\x1b[32mINFO\x1b[0m",
      Level::Debug => "\x1b[34mDEBUG\x1b[0m",
      Level::Trace => "\x1b[36mTRACE\x1b[0m",
    }
  }

  struct Logger<W> {
    name:   String,
    color:  bool,
    writer: Mutex<W>,
  }

  impl<W: io::Write> Logger<W> {
    fn write_record(&self, record: &Record) -> io::Result<()> {
      let now = chrono::Local::now();
      let mut w = self.writer.lock();
      write!(
        w,
        "{} {} [{}]",
        now.format("%Y-%m-%d %H:%M:%S%.3f"),
        self.name,
        level_tag(self.color, record.level()),
      )?;
      // Debug and trace lines name the module they came from; the protocol
      // handlers all log through the same few macros, and at those levels
      // the interesting question is which one.
      if record.level() >= Level::Debug {
        if let Some(path) = record.module_path() {
          write!(w, " {path}")?;
          if let Some(line) = record.line() {
            write!(w, ":{line}")?;
          }
        }
      }
      writeln!(w, " {}", record.args())
    }
  }

  impl<W: io::Write + Send + Sync> log::Log for Logger<W> {
    fn enabled(&self, metadata: &Metadata) -> bool {
      // ureq narrates every request; the server makes one per ownership miss.
      !metadata.target().starts_with("ureq")
    }

    fn log(&self, record: &Record) {
      if self.enabled(record.metadata()) {
        let _ = self.write_record(record);
      }
    }

    fn flush(&self) { let _ = self.writer.lock().flush(); }
  }

  log::set_boxed_logger(Box::new(Logger { name: name.into(), color, writer: Mutex::new(writer) }))
    .map(|()| log::set_max_level(level))
    .unwrap();
}
