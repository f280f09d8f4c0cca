//! # rest-orm-db
//!
//! A Django-style ORM whose storage is a remote REST API.
//!
//! Models are declared at runtime with [`orm::ModelBuilder`] and registered in
//! an [`orm::Registry`], which owns the transport and settings. Querysets are
//! lazy: nothing is sent until results are needed, and each queryset issues
//! its listing request at most once.
//!
//! ## Example
//!
//! ```rust,ignore
//! use rest_orm_db::orm::{Field, ModelBuilder, Registry};
//! use rest_orm_db::lookups;
//!
//! let registry = Registry::global();
//! let customer = ModelBuilder::new("Customer")
//!     .resource("customers")
//!     .base_url("http://example.org")
//!     .register(registry)?;
//! let device = ModelBuilder::new("Device")
//!     .resource("devices")
//!     .base_url("http://example.org")
//!     .field(Field::reference("customer", "Customer").related_name("devices"))
//!     .register(registry)?;
//! registry.finalize()?;
//!
//! let acme = customer.objects().get(lookups! { "name" => "ACME" })?;
//! for device in acme.related_set("devices")?.iter()? {
//!     println!("{:?}", device?);
//! }
//! ```

pub mod orm;

pub use orm::{
	Entity, Field, FieldKind, FieldValue, Lookups, Model, ModelBuilder, QuerySet, Registry,
};
