//! Client settings and the layered settings builder.

use crate::sources::{ConfigSource, EnvSource, SettingsMap, SourceError, TomlFile, parse_toml};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;

/// Environment variable prefix used by [`ClientSettings::from_env`].
pub const ENV_PREFIX: &str = "REST_ORM_";

/// Error raised while assembling settings
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
	#[error("Failed to load {source_name}: {error}")]
	Source {
		source_name: String,
		#[source]
		error: SourceError,
	},

	#[error("Invalid settings: {0}")]
	Invalid(#[from] serde_json::Error),
}

/// Settings shared by every model of a registry.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientSettings {
	/// Base URL used by models that do not declare their own.
	pub default_base_url: Option<String>,

	/// Timeout applied by the HTTP transport, in seconds.
	pub request_timeout_secs: Option<u64>,

	/// Warn about serializer fields that have no declared counterpart.
	pub missing_field_warnings: bool,

	/// Serializer field kinds never reported as missing.
	pub suppress_missing_field_warnings_for_types: Vec<String>,

	/// Warn when a declared reference and the serializer disagree on `related_name`.
	pub inconsistent_related_name_warnings: bool,

	/// Warn when the declared primary key differs from the serializer's.
	pub inconsistent_primary_key_warnings: bool,
}

impl Default for ClientSettings {
	fn default() -> Self {
		Self {
			default_base_url: None,
			request_timeout_secs: None,
			missing_field_warnings: false,
			suppress_missing_field_warnings_for_types: Vec::new(),
			inconsistent_related_name_warnings: false,
			inconsistent_primary_key_warnings: false,
		}
	}
}

impl ClientSettings {
	/// Parse settings from a TOML document.
	///
	/// # Examples
	///
	/// ```
	/// use rest_orm_conf::ClientSettings;
	///
	/// let settings = ClientSettings::from_toml_str(r#"default_base_url = "http://example.org""#).unwrap();
	/// assert_eq!(settings.default_base_url.as_deref(), Some("http://example.org"));
	/// ```
	pub fn from_toml_str(content: &str) -> Result<Self, SettingsError> {
		let values = parse_toml(content).map_err(|error| SettingsError::Source {
			source_name: "TOML string".to_string(),
			error,
		})?;
		Self::from_values(values)
	}

	/// Load settings from a TOML file. A missing file yields the defaults.
	pub fn from_file(path: impl AsRef<Path>) -> Result<Self, SettingsError> {
		SettingsBuilder::new()
			.add_source(TomlFile::new(path.as_ref()))
			.build()
	}

	/// Load settings from `REST_ORM_*` environment variables.
	pub fn from_env() -> Result<Self, SettingsError> {
		SettingsBuilder::new()
			.add_source(EnvSource::new(ENV_PREFIX))
			.build()
	}

	/// Overlay `REST_ORM_*` environment variables on top of these settings.
	pub fn with_env_overrides(self) -> Result<Self, SettingsError> {
		let mut values = match serde_json::to_value(&self)? {
			Value::Object(map) => map.into_iter().collect::<SettingsMap>(),
			_ => SettingsMap::new(),
		};
		let source = EnvSource::new(ENV_PREFIX);
		let overrides = source.load().map_err(|error| SettingsError::Source {
			source_name: source.to_string(),
			error,
		})?;
		values.extend(overrides);
		Self::from_values(values)
	}

	/// Set the default base URL
	pub fn with_default_base_url(mut self, url: impl Into<String>) -> Self {
		self.default_base_url = Some(url.into());
		self
	}

	/// Set the transport timeout
	pub fn with_request_timeout_secs(mut self, secs: u64) -> Self {
		self.request_timeout_secs = Some(secs);
		self
	}

	/// Enable or disable all serializer-schema warnings at once
	pub fn with_schema_warnings(mut self, enabled: bool) -> Self {
		self.missing_field_warnings = enabled;
		self.inconsistent_related_name_warnings = enabled;
		self.inconsistent_primary_key_warnings = enabled;
		self
	}

	/// Check whether a missing serializer field of `kind` should be reported.
	pub fn reports_missing_field(&self, kind: &str) -> bool {
		self.missing_field_warnings
			&& !self
				.suppress_missing_field_warnings_for_types
				.iter()
				.any(|suppressed| suppressed == kind)
	}

	fn from_values(values: SettingsMap) -> Result<Self, SettingsError> {
		let object: serde_json::Map<String, Value> = values.into_iter().collect();
		Ok(serde_json::from_value(Value::Object(object))?)
	}
}

/// Merges configuration sources into [`ClientSettings`], environment
/// values over file values.
#[derive(Default)]
pub struct SettingsBuilder {
	sources: Vec<Box<dyn ConfigSource>>,
}

impl SettingsBuilder {
	/// Create an empty builder
	pub fn new() -> Self {
		Self::default()
	}

	/// Add a configuration source
	pub fn add_source(mut self, source: impl ConfigSource + 'static) -> Self {
		self.sources.push(Box::new(source));
		self
	}

	/// Load every source and merge them by layer. Sources of the same
	/// layer apply in the order they were added.
	pub fn build(mut self) -> Result<ClientSettings, SettingsError> {
		self.sources.sort_by_key(|source| source.layer());

		let mut merged = SettingsMap::new();
		for source in &self.sources {
			let values = source.load().map_err(|error| SettingsError::Source {
				source_name: source.to_string(),
				error,
			})?;
			tracing::debug!(
				source = %source,
				keys = values.len(),
				"loaded settings source"
			);
			merged.extend(values);
		}

		ClientSettings::from_values(merged)
	}
}
