//! Model registry.
//!
//! The registry maps model names to [`Model`] handles and owns the transport
//! and settings models use. Declaring a reference schedules a reverse
//! accessor on its target; since the target may not be registered yet,
//! these bindings are queued and installed by [`Registry::finalize`], the
//! explicit bootstrap step run once every model is registered.

use super::fields::Field;
use super::model::{Model, ModelBuilder, ModelInner};
use indexmap::IndexMap;
use once_cell::sync::Lazy;
use parking_lot::{Mutex, RwLock};
use rest_orm_conf::ClientSettings;
use rest_orm_core::{Error, HttpTransport, Result, Transport};
use std::fmt;
use std::sync::Arc;

/// A reverse accessor waiting for its target model.
struct PendingBinding {
	source: String,
	target: String,
	field: Field,
}

pub(crate) struct RegistryInner {
	models: RwLock<IndexMap<String, Model>>,
	pending: Mutex<Vec<PendingBinding>>,
	transport: RwLock<Option<Arc<dyn Transport>>>,
	settings: RwLock<ClientSettings>,
}

/// Handle to a set of models sharing a transport and settings.
#[derive(Clone)]
pub struct Registry {
	inner: Arc<RegistryInner>,
}

static GLOBAL_REGISTRY: Lazy<Registry> = Lazy::new(|| {
	let settings = ClientSettings::from_env().unwrap_or_else(|error| {
		tracing::warn!(%error, "ignoring invalid REST_ORM_* settings");
		ClientSettings::default()
	});
	Registry::with_settings(settings)
});

impl Registry {
	/// Create a registry using `transport`.
	pub fn new(transport: Arc<dyn Transport>, settings: ClientSettings) -> Self {
		let registry = Self::with_settings(settings);
		registry.set_transport(transport);
		registry
	}

	/// Create a registry whose HTTP transport is built on first use.
	pub fn with_settings(settings: ClientSettings) -> Self {
		Self {
			inner: Arc::new(RegistryInner {
				models: RwLock::new(IndexMap::new()),
				pending: Mutex::new(Vec::new()),
				transport: RwLock::new(None),
				settings: RwLock::new(settings),
			}),
		}
	}

	/// The process-wide registry, configured from `REST_ORM_*` variables.
	pub fn global() -> &'static Registry {
		&GLOBAL_REGISTRY
	}

	pub(crate) fn from_inner(inner: Arc<RegistryInner>) -> Self {
		Self { inner }
	}

	pub fn set_transport(&self, transport: Arc<dyn Transport>) {
		*self.inner.transport.write() = Some(transport);
	}

	/// The transport, building the HTTP transport if none was set.
	pub fn transport(&self) -> Result<Arc<dyn Transport>> {
		if let Some(transport) = self.inner.transport.read().as_ref() {
			return Ok(Arc::clone(transport));
		}
		let mut slot = self.inner.transport.write();
		if let Some(transport) = slot.as_ref() {
			return Ok(Arc::clone(transport));
		}
		let transport: Arc<dyn Transport> =
			Arc::new(HttpTransport::from_settings(&self.inner.settings.read())?);
		*slot = Some(Arc::clone(&transport));
		Ok(transport)
	}

	pub fn settings(&self) -> ClientSettings {
		self.inner.settings.read().clone()
	}

	pub fn set_settings(&self, settings: ClientSettings) {
		*self.inner.settings.write() = settings;
	}

	/// Register a model declaration.
	///
	/// Serializer-schema fields are generated first, then the model is
	/// stored, replacing any model of the same name. Reverse accessors of
	/// its references are queued for [`finalize`](Self::finalize).
	pub fn register(&self, builder: ModelBuilder) -> Result<Model> {
		let ModelBuilder {
			name,
			resource,
			base_url,
			primary_key,
			get_latest_by,
			content_type,
			mut fields,
			methods,
			manager,
			schema,
		} = builder;

		if let Some(schema) = &schema {
			schema.apply(&name, &primary_key, &mut fields, &self.settings())?;
		}

		let bindings: Vec<PendingBinding> = fields
			.iter()
			.filter_map(|field| field.reverse_binding(&name))
			.map(|(target, field)| PendingBinding {
				source: name.clone(),
				target,
				field,
			})
			.collect();

		let model = Model {
			inner: Arc::new(ModelInner {
				resource: resource.unwrap_or_else(|| name.to_lowercase()),
				base_url,
				primary_key,
				get_latest_by,
				content_type,
				fields: RwLock::new(
					fields
						.into_iter()
						.map(|field| (field.name().to_string(), field))
						.collect(),
				),
				methods: methods
					.into_iter()
					.map(|method| (method.name().to_string(), method))
					.collect(),
				manager,
				registry: Arc::downgrade(&self.inner),
				name: name.clone(),
			}),
		};

		if self
			.inner
			.models
			.write()
			.insert(name.clone(), model.clone())
			.is_some()
		{
			tracing::warn!(model = %name, "model registered twice; replacing previous declaration");
		}
		self.inner.pending.lock().extend(bindings);
		tracing::debug!(model = %name, resource = model.resource(), "registered model");

		Ok(model)
	}

	/// Install every queued reverse accessor.
	///
	/// Bindings whose target is not registered are dropped and reported:
	/// the first one is returned as [`Error::ModelNotRegistered`].
	pub fn finalize(&self) -> Result<()> {
		let pending = std::mem::take(&mut *self.inner.pending.lock());
		let mut first_error = None;

		for binding in pending {
			let Some(target) = self.get(&binding.target) else {
				tracing::error!(
					source = %binding.source,
					target = %binding.target,
					"reference target is not registered"
				);
				first_error.get_or_insert(Error::ModelNotRegistered(binding.target));
				continue;
			};
			let accessor = binding.field.name().to_string();
			if target.contribute_field(binding.field) {
				tracing::debug!(model = %binding.target, %accessor, "installed reverse reference");
			}
		}

		match first_error {
			Some(error) => Err(error),
			None => Ok(()),
		}
	}

	/// Number of reverse accessors waiting for [`finalize`](Self::finalize).
	pub fn pending_bindings(&self) -> usize {
		self.inner.pending.lock().len()
	}

	pub fn get(&self, name: &str) -> Option<Model> {
		self.inner.models.read().get(name).cloned()
	}

	/// The model registered as `name`, or [`Error::ModelNotRegistered`].
	pub fn lookup(&self, name: &str) -> Result<Model> {
		self.get(name)
			.ok_or_else(|| Error::ModelNotRegistered(name.to_string()))
	}

	/// The model declaring `content_type`.
	pub fn by_content_type(&self, content_type: &str) -> Option<Model> {
		self.inner
			.models
			.read()
			.values()
			.find(|model| model.content_type() == Some(content_type))
			.cloned()
	}

	pub fn models(&self) -> Vec<Model> {
		self.inner.models.read().values().cloned().collect()
	}
}

impl fmt::Debug for Registry {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Registry")
			.field("models", &self.inner.models.read().keys().collect::<Vec<_>>())
			.field("pending", &self.pending_bindings())
			.finish()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::orm::fields::FieldKind;
	use rest_orm_mocks::MockTransport;
	use rstest::{fixture, rstest};

	#[fixture]
	fn registry() -> Registry {
		Registry::new(Arc::new(MockTransport::new()), ClientSettings::default())
	}

	#[rstest]
	fn test_reverse_binding_deferred_until_finalize(registry: Registry) {
		ModelBuilder::new("Device")
			.field(Field::reference("customer", "Customer").related_name("devices"))
			.register(&registry)
			.unwrap();
		let customer = ModelBuilder::new("Customer").register(&registry).unwrap();

		assert_eq!(registry.pending_bindings(), 1);
		assert!(customer.field("devices").is_none());

		registry.finalize().unwrap();

		assert_eq!(registry.pending_bindings(), 0);
		assert!(matches!(
			customer.field("devices").map(|f| f.kind().clone()),
			Some(FieldKind::ReverseReference { .. })
		));
	}

	#[rstest]
	fn test_default_reverse_name(registry: Registry) {
		ModelBuilder::new("Customer").register(&registry).unwrap();
		ModelBuilder::new("Invoice")
			.field(Field::reference("customer", "Customer"))
			.register(&registry)
			.unwrap();

		registry.finalize().unwrap();

		assert!(registry.lookup("Customer").unwrap().field("invoice_set").is_some());
	}

	#[rstest]
	fn test_existing_attribute_is_kept(registry: Registry) {
		ModelBuilder::new("Customer")
			.field(Field::plain("devices"))
			.register(&registry)
			.unwrap();
		ModelBuilder::new("Device")
			.field(Field::reference("customer", "Customer").related_name("devices"))
			.register(&registry)
			.unwrap();

		registry.finalize().unwrap();

		let customer = registry.lookup("Customer").unwrap();
		assert_eq!(customer.field("devices").map(|f| f.kind().clone()), Some(FieldKind::Plain));
	}

	#[rstest]
	fn test_unresolvable_target_is_fatal(registry: Registry) {
		ModelBuilder::new("Device")
			.field(Field::reference("customer", "Customer"))
			.register(&registry)
			.unwrap();

		let result = registry.finalize();

		assert!(matches!(result, Err(Error::ModelNotRegistered(name)) if name == "Customer"));
		assert_eq!(registry.pending_bindings(), 0);
		assert!(registry.finalize().is_ok());
	}

	#[rstest]
	fn test_lookup_and_content_type(registry: Registry) {
		ModelBuilder::new("Order")
			.content_type("shop_order")
			.register(&registry)
			.unwrap();

		assert!(registry.lookup("Order").is_ok());
		assert!(matches!(registry.lookup("Missing"), Err(Error::ModelNotRegistered(_))));
		assert_eq!(
			registry.by_content_type("shop_order").map(|m| m.name().to_string()),
			Some("Order".to_string())
		);
		assert!(registry.by_content_type("shop_item").is_none());
	}
}
