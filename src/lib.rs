//! # rest-orm
//!
//! A Django-style ORM for Rust whose storage is a Django REST Framework API.
//!
//! Models describe REST resources instead of tables. Querysets translate
//! filtering, ordering and slicing into query parameters, entities track
//! their changes and save them with `POST` and `PATCH`, and references are
//! dereferenced lazily with further calls.
//!
//! ## Crates
//!
//! - [`conf`] - client settings from TOML files and `REST_ORM_*` variables
//! - [`core`] - errors, the transport seam and the request-scope cache
//! - [`db`] - models, entities and querysets
//! - [`shortcuts`] - `get_object_or_404` and model helpers (feature
//!   `shortcuts`)
//!
//! ## Quick Example
//!
//! ```rust,ignore
//! use rest_orm::prelude::*;
//!
//! let registry = Registry::with_settings(
//!     ClientSettings::default().with_default_base_url("http://localhost:8000/api"),
//! );
//! let customer = ModelBuilder::new("Customer")
//!     .resource("customers")
//!     .get_latest_by("created_at")
//!     .field(Field::datetime("created_at"))
//!     .register(&registry)?;
//! let device = ModelBuilder::new("Device")
//!     .resource("devices")
//!     .field(Field::reference("customer", "Customer").related_name("devices"))
//!     .register(&registry)?;
//! registry.finalize()?;
//!
//! let acme = customer.objects().get(("name", "ACME"))?;
//! let phone = device.objects().create(lookups! { "name" => "Phone", "customer" => &acme })?;
//!
//! phone.set("name", "Work phone");
//! phone.save()?; // PATCH {"name": "Work phone"}
//!
//! for device in acme.related_set("devices")?.order_by(&["-id"]).iter()? {
//!     println!("{:?}", device?);
//! }
//! ```

pub use rest_orm_conf as conf;
pub use rest_orm_core as core;
pub use rest_orm_db as db;
#[cfg(feature = "shortcuts")]
pub use rest_orm_shortcuts as shortcuts;

pub use rest_orm_conf::{ClientSettings, SettingsBuilder, SettingsError};
pub use rest_orm_core::{
	Error, ErrorResponse, HttpTransport, Method, RequestScope, RestRequest, RestResponse, Result,
	Transport,
};
pub use rest_orm_db::lookups;
pub use rest_orm_db::orm::{
	ContentTypeRef, Entity, Field, FieldFile, FieldKind, FieldValue, FilterOp, Lookups,
	MethodOutput, Model, ModelBuilder, QuerySet, Registry, RemoteMethod, Resolved,
	SerializerField, SerializerSchema,
};

#[cfg(feature = "shortcuts")]
pub use rest_orm_shortcuts::{
	GetError, get_content_type_for_model, get_list_or_404, get_object_or_404, model_to_dict,
};

pub mod prelude {
	pub use crate::{
		ClientSettings, Entity, Error, Field, FieldValue, FilterOp, Lookups, Method, Model,
		ModelBuilder, QuerySet, Registry, RemoteMethod, RequestScope, Result, lookups,
	};

	#[cfg(feature = "shortcuts")]
	pub use crate::{GetError, get_list_or_404, get_object_or_404};
}
