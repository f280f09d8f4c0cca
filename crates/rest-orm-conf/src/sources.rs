//! Where client settings come from.
//!
//! A source yields a partial settings map holding only the keys it sets,
//! already shaped for [`ClientSettings`](crate::ClientSettings). The
//! [`SettingsBuilder`](crate::SettingsBuilder) merges sources by [`Layer`].

use indexmap::IndexMap;
use serde_json::Value;
use std::fmt;
use std::fs;
use std::io;
use std::path::PathBuf;

/// Setting names mapped to their values.
pub type SettingsMap = IndexMap<String, Value>;

/// Table that may hold the settings inside a shared TOML file.
const TOML_TABLE: &str = "rest_orm";

/// Precedence of a source. Later layers override earlier ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Layer {
	File,
	Environment,
}

/// A provider of settings values.
pub trait ConfigSource: fmt::Display + Send + Sync {
	fn load(&self) -> Result<SettingsMap, SourceError>;

	fn layer(&self) -> Layer;
}

#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
	#[error("cannot read {}: {error}", .path.display())]
	Read {
		path: PathBuf,
		#[source]
		error: io::Error,
	},

	#[error("TOML error: {0}")]
	Toml(#[from] toml::de::Error),

	#[error("[{0}] is not a table")]
	NotATable(String),

	#[error("{name}={value:?} is not {expected}")]
	InvalidValue {
		name: String,
		value: String,
		expected: &'static str,
	},
}

/// Shape of a setting's value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
	Text,
	Seconds,
	Flag,
	List,
}

const KEYS: [(&str, Kind); 6] = [
	("default_base_url", Kind::Text),
	("request_timeout_secs", Kind::Seconds),
	("missing_field_warnings", Kind::Flag),
	("suppress_missing_field_warnings_for_types", Kind::List),
	("inconsistent_related_name_warnings", Kind::Flag),
	("inconsistent_primary_key_warnings", Kind::Flag),
];

fn kind_of(key: &str) -> Option<Kind> {
	KEYS.iter()
		.find(|(name, _)| *name == key)
		.map(|(_, kind)| *kind)
}

/// Settings from prefixed environment variables.
///
/// `REST_ORM_MISSING_FIELD_WARNINGS=on` sets `missing_field_warnings`.
/// Values are parsed by the type of their setting; list settings are
/// comma separated. Prefixed variables naming no setting are skipped with
/// a warning.
///
/// # Examples
///
/// ```
/// use rest_orm_conf::sources::{ConfigSource, EnvSource, Layer};
///
/// let source = EnvSource::new("REST_ORM_");
/// assert_eq!(source.layer(), Layer::Environment);
/// assert_eq!(source.to_string(), "environment (REST_ORM_*)");
/// ```
pub struct EnvSource {
	prefix: String,
}

impl EnvSource {
	pub fn new(prefix: impl Into<String>) -> Self {
		Self {
			prefix: prefix.into(),
		}
	}

	fn collect(
		&self,
		vars: impl IntoIterator<Item = (String, String)>,
	) -> Result<SettingsMap, SourceError> {
		let mut settings = SettingsMap::new();
		for (var, raw) in vars {
			let Some(stripped) = var.strip_prefix(self.prefix.as_str()) else {
				continue;
			};
			let key = stripped.to_lowercase();
			let Some(kind) = kind_of(&key) else {
				tracing::warn!(variable = %var, "ignoring unknown rest-orm setting");
				continue;
			};
			let value = parse_env_value(kind, &var, &raw)?;
			settings.insert(key, value);
		}
		Ok(settings)
	}
}

fn parse_env_value(kind: Kind, name: &str, raw: &str) -> Result<Value, SourceError> {
	let invalid = |expected| SourceError::InvalidValue {
		name: name.to_string(),
		value: raw.to_string(),
		expected,
	};
	let trimmed = raw.trim();
	match kind {
		Kind::Text => Ok(Value::String(raw.to_string())),
		Kind::Seconds => trimmed
			.parse::<u64>()
			.map(Value::from)
			.map_err(|_| invalid("a number of seconds")),
		Kind::Flag => match trimmed.to_lowercase().as_str() {
			"1" | "true" | "yes" | "on" => Ok(Value::Bool(true)),
			"0" | "false" | "no" | "off" => Ok(Value::Bool(false)),
			_ => Err(invalid("a boolean")),
		},
		Kind::List => Ok(Value::Array(
			trimmed
				.split(',')
				.map(str::trim)
				.filter(|item| !item.is_empty())
				.map(|item| Value::String(item.to_string()))
				.collect(),
		)),
	}
}

impl ConfigSource for EnvSource {
	fn load(&self) -> Result<SettingsMap, SourceError> {
		self.collect(std::env::vars())
	}

	fn layer(&self) -> Layer {
		Layer::Environment
	}
}

impl fmt::Display for EnvSource {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "environment ({}*)", self.prefix)
	}
}

/// Settings from a TOML file.
///
/// Settings live at the top level, or in a `[rest_orm]` table when the file
/// is shared with other tools. A missing file sets nothing.
pub struct TomlFile {
	path: PathBuf,
}

impl TomlFile {
	pub fn new(path: impl Into<PathBuf>) -> Self {
		Self { path: path.into() }
	}
}

impl ConfigSource for TomlFile {
	fn load(&self) -> Result<SettingsMap, SourceError> {
		let content = match fs::read_to_string(&self.path) {
			Ok(content) => content,
			Err(error) if error.kind() == io::ErrorKind::NotFound => {
				tracing::debug!(path = %self.path.display(), "no settings file");
				return Ok(SettingsMap::new());
			}
			Err(error) => {
				return Err(SourceError::Read {
					path: self.path.clone(),
					error,
				});
			}
		};
		parse_toml(&content)
	}

	fn layer(&self) -> Layer {
		Layer::File
	}
}

impl fmt::Display for TomlFile {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "TOML file {}", self.path.display())
	}
}

/// Read the settings of a TOML document. Unknown keys are skipped with a
/// warning; value types are checked when the settings are built.
pub(crate) fn parse_toml(content: &str) -> Result<SettingsMap, SourceError> {
	let mut table: toml::Table = toml::from_str(content)?;
	if let Some(nested) = table.remove(TOML_TABLE) {
		table = match nested {
			toml::Value::Table(nested) => nested,
			_ => return Err(SourceError::NotATable(TOML_TABLE.to_string())),
		};
	}

	let mut settings = SettingsMap::new();
	for (key, value) in table {
		if kind_of(&key).is_none() {
			tracing::warn!(%key, "ignoring unknown rest-orm setting");
			continue;
		}
		let value = match value {
			toml::Value::String(s) => Value::String(s),
			toml::Value::Integer(i) => Value::from(i),
			toml::Value::Boolean(b) => Value::Bool(b),
			toml::Value::Array(items) => Value::Array(
				items
					.into_iter()
					.map(|item| match item {
						toml::Value::String(s) => Value::String(s),
						other => Value::String(other.to_string()),
					})
					.collect(),
			),
			other => Value::String(other.to_string()),
		};
		settings.insert(key, value);
	}
	Ok(settings)
}
