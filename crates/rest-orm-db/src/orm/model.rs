//! Model declarations.
//!
//! A [`Model`] is a cheap, clonable handle describing one REST resource:
//! its URLs, primary key, declared fields and subresource methods. Models
//! are created with [`ModelBuilder`] and live in a [`Registry`].

use super::entity::Entity;
use super::fields::Field;
use super::method::{MethodOutput, RemoteMethod};
use super::query::QuerySet;
use super::registry::{Registry, RegistryInner};
use super::schema::SerializerSchema;
use super::value::Lookups;
use convert_case::{Case, Casing};
use indexmap::IndexMap;
use parking_lot::RwLock;
use rest_orm_core::querystring::value_to_param;
use rest_orm_core::{Error, RequestScope, RestRequest, Result, rest_call};
use serde_json::Value;
use std::fmt;
use std::sync::{Arc, Weak};

/// Builds the default queryset of a model, like a custom manager.
pub type ManagerFn = Arc<dyn Fn(QuerySet) -> QuerySet + Send + Sync>;

pub(crate) struct ModelInner {
	pub(crate) name: String,
	pub(crate) resource: String,
	pub(crate) base_url: Option<String>,
	pub(crate) primary_key: String,
	pub(crate) get_latest_by: Option<String>,
	pub(crate) content_type: Option<String>,
	pub(crate) fields: RwLock<IndexMap<String, Field>>,
	pub(crate) methods: IndexMap<String, RemoteMethod>,
	pub(crate) manager: Option<ManagerFn>,
	pub(crate) registry: Weak<RegistryInner>,
}

/// Handle to a registered model.
#[derive(Clone)]
pub struct Model {
	pub(crate) inner: Arc<ModelInner>,
}

impl Model {
	/// The model name, e.g. `"Customer"`.
	pub fn name(&self) -> &str {
		&self.inner.name
	}

	/// Same as [`name`](Self::name).
	pub fn object_name(&self) -> &str {
		&self.inner.name
	}

	/// The lowercase model name, e.g. `"customerdevice"`.
	pub fn model_name(&self) -> String {
		self.inner.name.to_lowercase()
	}

	/// The human readable name, e.g. `"customer device"`.
	pub fn verbose_name(&self) -> String {
		self.inner.name.to_case(Case::Lower)
	}

	pub fn resource(&self) -> &str {
		&self.inner.resource
	}

	pub fn primary_key(&self) -> &str {
		&self.inner.primary_key
	}

	pub fn get_latest_by(&self) -> Option<&str> {
		self.inner.get_latest_by.as_deref()
	}

	pub fn content_type(&self) -> Option<&str> {
		self.inner.content_type.as_deref()
	}

	/// The declared field with attribute name `name`.
	pub fn field(&self, name: &str) -> Option<Field> {
		self.inner.fields.read().get(name).cloned()
	}

	/// Every declared field, in declaration order.
	pub fn fields(&self) -> Vec<Field> {
		self.inner.fields.read().values().cloned().collect()
	}

	/// Attribute names of every declared field.
	pub fn field_names(&self) -> Vec<String> {
		self.inner.fields.read().keys().cloned().collect()
	}

	/// The declared reference whose `<name>_id` shadow accessor is `attname`.
	pub(crate) fn shadow_reference(&self, attname: &str) -> Option<Field> {
		let base = attname.strip_suffix("_id")?;
		self.field(base).filter(Field::is_reference)
	}

	/// Install a field unless the attribute is taken. Returns whether it was added.
	pub(crate) fn contribute_field(&self, field: Field) -> bool {
		let mut fields = self.inner.fields.write();
		if fields.contains_key(field.name()) {
			return false;
		}
		fields.insert(field.name().to_string(), field);
		true
	}

	pub fn method(&self, name: &str) -> Option<&RemoteMethod> {
		self.inner.methods.get(name)
	}

	/// The registry owning this model.
	pub fn registry(&self) -> Result<Registry> {
		self.inner
			.registry
			.upgrade()
			.map(Registry::from_inner)
			.ok_or_else(|| {
				Error::ImproperlyConfigured(format!(
					"the registry of model {} has been dropped",
					self.inner.name
				))
			})
	}

	/// The model's base URL, falling back to the registry default.
	pub fn base_url(&self) -> Result<String> {
		let base = match &self.inner.base_url {
			Some(url) => url.clone(),
			None => self.registry()?.settings().default_base_url.ok_or_else(|| {
				Error::ImproperlyConfigured(format!(
					"model {} declares no base URL and no default_base_url is configured",
					self.inner.name
				))
			})?,
		};
		Ok(base.trim_end_matches('/').to_string())
	}

	/// `{base_url}/{resource}/`
	pub fn resources_url(&self) -> Result<String> {
		Ok(format!("{}/{}/", self.base_url()?, self.inner.resource))
	}

	/// `{base_url}/{resource}/{pk}/`
	pub fn resource_url(&self, pk: &Value) -> Result<String> {
		let pk = value_to_param(pk).ok_or_else(|| {
			Error::InvalidArgument(format!(
				"cannot address a {} without a primary key",
				self.inner.name
			))
		})?;
		Ok(format!("{}{}/", self.resources_url()?, pk))
	}

	/// Run a REST call on behalf of this model.
	pub fn rest_call(
		&self,
		request: &RestRequest,
		scope: Option<&RequestScope>,
	) -> Result<Option<Value>> {
		let transport = self.registry()?.transport()?;
		rest_call(transport.as_ref(), scope, &self.inner.name, request)
	}

	/// The base queryset, shaped by the model's manager.
	pub fn objects(&self) -> QuerySet {
		let queryset = QuerySet::new(self.clone());
		match &self.inner.manager {
			Some(manager) => manager(queryset),
			None => queryset,
		}
	}

	/// A new, unsaved entity.
	pub fn new_entity(&self, attrs: impl Into<Lookups>) -> Entity {
		Entity::new(self, attrs)
	}

	/// Call a static subresource method: `{base_url}/{resource}/{subresource}/`.
	pub fn call_static(&self, name: &str, kwargs: impl Into<Lookups>) -> Result<MethodOutput> {
		let method = self.method(name).ok_or_else(|| {
			Error::InvalidArgument(format!("{} has no method {}", self.inner.name, name))
		})?;
		method.invoke(self, None, kwargs.into(), None)
	}
}

impl PartialEq for Model {
	fn eq(&self, other: &Self) -> bool {
		Arc::ptr_eq(&self.inner, &other.inner)
	}
}

impl Eq for Model {}

impl fmt::Debug for Model {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Model")
			.field("name", &self.inner.name)
			.field("resource", &self.inner.resource)
			.finish()
	}
}

/// Declares a model.
///
/// # Examples
///
/// ```rust,ignore
/// let device = ModelBuilder::new("Device")
///     .resource("devices")
///     .base_url("http://example.org")
///     .get_latest_by("created_at")
///     .field(Field::datetime("created_at"))
///     .field(Field::reference("customer", "Customer").related_name("devices"))
///     .register(&registry)?;
/// ```
pub struct ModelBuilder {
	pub(crate) name: String,
	pub(crate) resource: Option<String>,
	pub(crate) base_url: Option<String>,
	pub(crate) primary_key: String,
	pub(crate) get_latest_by: Option<String>,
	pub(crate) content_type: Option<String>,
	pub(crate) fields: Vec<Field>,
	pub(crate) methods: Vec<RemoteMethod>,
	pub(crate) manager: Option<ManagerFn>,
	pub(crate) schema: Option<SerializerSchema>,
}

impl ModelBuilder {
	pub fn new(name: impl Into<String>) -> Self {
		Self {
			name: name.into(),
			resource: None,
			base_url: None,
			primary_key: "id".to_string(),
			get_latest_by: None,
			content_type: None,
			fields: Vec::new(),
			methods: Vec::new(),
			manager: None,
			schema: None,
		}
	}

	/// The collection path segment. Defaults to the lowercase model name.
	pub fn resource(mut self, resource: impl Into<String>) -> Self {
		self.resource = Some(resource.into());
		self
	}

	pub fn base_url(mut self, url: impl Into<String>) -> Self {
		self.base_url = Some(url.into());
		self
	}

	/// The primary key attribute. Defaults to `"id"`.
	pub fn primary_key(mut self, key: impl Into<String>) -> Self {
		self.primary_key = key.into();
		self
	}

	/// Default ordering field of `earliest` and `latest`.
	pub fn get_latest_by(mut self, field: impl Into<String>) -> Self {
		self.get_latest_by = Some(field.into());
		self
	}

	/// The `"<app_label>_<model>"` identifier used by generic relations.
	pub fn content_type(mut self, content_type: impl Into<String>) -> Self {
		self.content_type = Some(content_type.into());
		self
	}

	pub fn field(mut self, field: Field) -> Self {
		self.fields.push(field);
		self
	}

	pub fn method(mut self, method: RemoteMethod) -> Self {
		self.methods.push(method);
		self
	}

	/// Shape the queryset returned by [`Model::objects`].
	///
	/// ```rust,ignore
	/// ModelBuilder::new("Customer").manager(|qs| qs.order_by(&["name"]))
	/// ```
	pub fn manager<F>(mut self, manager: F) -> Self
	where
		F: Fn(QuerySet) -> QuerySet + Send + Sync + 'static,
	{
		self.manager = Some(Arc::new(manager));
		self
	}

	/// Generate missing fields from the server serializer at registration.
	pub fn schema(mut self, schema: SerializerSchema) -> Self {
		self.schema = Some(schema);
		self
	}

	/// Register the model; see [`Registry::register`].
	pub fn register(self, registry: &Registry) -> Result<Model> {
		registry.register(self)
	}
}
