use log::{Level, LevelFilter};
use std::{fs, str::FromStr};
use toml::Value;


/// A config file backed by two TOML documents: the file on disk, and the
/// compiled-in default source. Lookups fall back to the default whenever the
/// primary is missing a key, so a half-written config file still runs.
pub struct Config {
  primary: Value,
  default: Value,
}

pub trait TomlValue<'a> {
  /// If the current type matches the toml value, this returns Some(v).
  fn from_toml(v: &'a Value) -> Option<Self>
  where
    Self: Sized;

  /// Returns the name of this toml value (string, integer, etc).
  fn name() -> String
  where
    Self: Sized;
}

/// A config key. This is a path to a value, split on dots. To index into
/// maps, use a string name for a section. To index into an array, use a
/// number. Example:
///
/// ```ignore
/// address = "0.0.0.0:9000"
/// [limits]
/// players = 64
/// servers = ["a:9000", "b:9000"]
/// ```
///
/// These are valid indices:
/// ```ignore
/// address        // points to "0.0.0.0:9000"
/// limits.players // points to 64
/// servers.1      // points to "b:9000"
/// ```
pub trait TomlKey {
  /// Returns the sections of this key.
  fn sections(&self) -> Vec<&str>;
}

impl TomlKey for str {
  fn sections(&self) -> Vec<&str> { self.split('.').collect() }
}
impl TomlKey for [&str] {
  fn sections(&self) -> Vec<&str> { self.to_vec() }
}

impl Config {
  /// Creates a new config for the given path. The path is a runtime path to
  /// load the config file from. The default source should be loaded with
  /// `include_str!`, and is used whenever a key is not present in the main
  /// config.
  pub fn new(path: &str, default_src: &str) -> Self {
    Config { primary: Self::load_toml(path), default: Self::load_toml_src(default_src) }
  }

  /// Same as [`new`](Self::new), but also writes the default source to
  /// `default_path`, so users have a reference for every available key. If
  /// the file cannot be written, a warning is printed.
  pub fn new_write_default(path: &str, default_path: &str, default_src: &str) -> Self {
    fs::write(default_path, default_src).unwrap_or_else(|e| {
      warn!("could not write default configuration to disk at `{default_path}`: {e}");
    });
    Config::new(path, default_src)
  }

  /// Creates a config directly from toml source. Used in tests.
  pub fn new_src(src: &str, default_src: &str) -> Self {
    Config { primary: Self::load_toml_src(src), default: Self::load_toml_src(default_src) }
  }

  fn load_toml(path: &str) -> Value {
    Self::load_toml_src(&fs::read_to_string(path).unwrap_or_else(|e| {
      error!("error loading config at `{path}`: {e}");
      "".into()
    }))
  }
  fn load_toml_src(src: &str) -> Value {
    src.parse().unwrap_or_else(|e| {
      error!("error parsing config: {e}");
      Value::Table(toml::map::Map::new())
    })
  }

  /// Reads the value at the given key. This will always return a value: if
  /// the key is missing from the primary config (or has the wrong type), the
  /// default config is used, and if it is missing there too, this panics. A
  /// key should always exist in the default config, so users can discover
  /// every key by reading the generated default file.
  pub fn get<'a, K: ?Sized, T>(&'a self, key: &K) -> T
  where
    K: TomlKey,
    T: TomlValue<'a>,
  {
    let sections = key.sections();
    match Self::get_val(&self.primary, &sections) {
      Some(val) => match T::from_toml(val) {
        Some(v) => v,
        None => {
          warn!(
            "unexpected value at `{}`: {val}, expected a {}",
            sections.join("."),
            T::name()
          );
          self.get_default(key)
        }
      },
      None => self.get_default(key),
    }
  }

  /// Gets the default value at the given key. This will panic if the key does
  /// not exist, or if it has the wrong type.
  pub fn get_default<'a, K: ?Sized, T>(&'a self, key: &K) -> T
  where
    K: TomlKey,
    T: TomlValue<'a>,
  {
    let sections = key.sections();
    let val = match Self::get_val(&self.default, &sections) {
      Some(v) => v,
      None => panic!("missing key in default config: `{}`", sections.join(".")),
    };
    match T::from_toml(val) {
      Some(v) => v,
      None => panic!(
        "default had wrong type for key `{}`: {val}, expected a {}",
        sections.join("."),
        T::name(),
      ),
    }
  }

  fn get_val<'a>(toml: &'a Value, sections: &[&str]) -> Option<&'a Value> {
    let mut val = toml;
    for s in sections {
      match val {
        Value::Table(map) => val = map.get(*s)?,
        Value::Array(arr) => val = arr.get(s.parse::<usize>().ok()?)?,
        _ => return None,
      }
    }
    Some(val)
  }
}

impl TomlValue<'_> for bool {
  fn from_toml(v: &Value) -> Option<Self> { v.as_bool() }

  fn name() -> String { "bool".into() }
}

impl TomlValue<'_> for Level {
  fn from_toml(v: &Value) -> Option<Self> { Level::from_str(v.as_str()?).ok() }
  fn name() -> String { "log level".into() }
}
impl TomlValue<'_> for LevelFilter {
  fn from_toml(v: &Value) -> Option<Self> { LevelFilter::from_str(v.as_str()?).ok() }
  fn name() -> String { "log level filter".into() }
}

impl<'a, T> TomlValue<'a> for Vec<T>
where
  T: TomlValue<'a>,
{
  fn from_toml(v: &'a Value) -> Option<Self> {
    v.as_array().and_then(|v| v.iter().map(|v| T::from_toml(v)).collect::<Option<Vec<T>>>())
  }

  fn name() -> String { format!("array of {}", T::name()) }
}

macro_rules! toml_number {
  ($name:expr, $($ty:ty),*) => {
    $(
      impl TomlValue<'_> for $ty {
        fn from_toml(v: &Value) -> Option<Self> {
          v.as_integer().and_then(|v| v.try_into().ok())
        }

        fn name() -> String {
          $name.into()
        }
      }
    )*
  };
}

toml_number!("integer", u8, u16, u32, u64, usize, i8, i16, i32, i64);

impl<'a> TomlValue<'a> for &'a str {
  fn from_toml(v: &'a Value) -> Option<Self> { v.as_str() }

  fn name() -> String { "string".into() }
}

impl TomlValue<'_> for String {
  fn from_toml(v: &Value) -> Option<Self> { v.as_str().map(|v| v.into()) }

  fn name() -> String { "string".into() }
}

impl TomlValue<'_> for f32 {
  fn from_toml(v: &Value) -> Option<Self> { v.as_float().map(|v| v as f32) }

  fn name() -> String { "float".into() }
}

impl TomlValue<'_> for f64 {
  fn from_toml(v: &Value) -> Option<Self> { v.as_float() }

  fn name() -> String { "float".into() }
}
