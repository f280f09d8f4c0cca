//! # Client settings
//!
//! Configuration for rest-orm clients: the default API base URL, transport
//! timeouts and the serializer-schema warning switches.
//!
//! Settings are assembled from layered sources merged in priority order
//! (environment variables > configuration files > defaults).
//!
//! ## Example
//!
//! ```rust,ignore
//! use rest_orm_conf::{ClientSettings, SettingsBuilder};
//! use rest_orm_conf::sources::{EnvSource, TomlFile};
//!
//! let settings: ClientSettings = SettingsBuilder::new()
//!     .add_source(TomlFile::new("rest_orm.toml"))
//!     .add_source(EnvSource::new("REST_ORM_"))
//!     .build()?;
//! ```

pub mod settings;
pub mod sources;

pub use settings::{ClientSettings, ENV_PREFIX, SettingsBuilder, SettingsError};
pub use sources::{ConfigSource, EnvSource, Layer, SettingsMap, SourceError, TomlFile};
