//! Entities: single records of a model.
//!
//! An [`Entity`] keeps two attribute maps. `original` is the baseline last
//! agreed with the server and `current` holds local edits; their difference
//! is what [`Entity::save`] sends for persisted entities. Reads of declared
//! fields go through the field behaviour (lazy parsing, dereferencing of
//! references, reverse querysets).
//!
//! Entities are shared handles: clones observe the same state, and a value
//! holding an entity refers to that very record.

use super::fields::{
	ContentTypeRef, Field, FieldFile, FieldKind, parse_date, parse_datetime, parse_time,
};
use super::method::MethodOutput;
use super::model::Model;
use super::query::{PrefetchGroup, QuerySet};
use super::value::{FieldValue, Lookups};
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveTime};
use indexmap::IndexMap;
use parking_lot::Mutex;
use rest_orm_core::{Error, Params, RequestScope, RestRequest, Result};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

type Attrs = IndexMap<String, FieldValue>;

struct EntityState {
	model: Model,
	original: Attrs,
	current: Attrs,
	persisted: bool,
	/// Dereferenced entities keyed by attribute name.
	related: HashMap<String, Entity>,
	/// Results of collection methods keyed by method name.
	collections: HashMap<String, Vec<Entity>>,
	/// Prefetch state of the listing that materialized this entity.
	prefetch: Option<Arc<PrefetchGroup>>,
	scope: Option<RequestScope>,
}

/// A record of a model.
#[derive(Clone)]
pub struct Entity {
	inner: Arc<Mutex<EntityState>>,
}

/// The value of an attribute as read through its field.
#[derive(Debug, Clone)]
pub enum Resolved {
	Value(Option<FieldValue>),
	DateTime(Option<DateTime<FixedOffset>>),
	Date(Option<NaiveDate>),
	Time(Option<NaiveTime>),
	File(Option<FieldFile>),
	ContentType(Option<ContentTypeRef>),
	Entity(Option<Entity>),
	QuerySet(QuerySet),
}

impl Entity {
	/// Create an unsaved entity.
	///
	/// A `pk` key addresses the primary key. Keys naming declared fields (or
	/// a reference's `<name>_id` accessor) are written through the field.
	///
	/// ```rust,ignore
	/// let device = Entity::new(&device_model, lookups! { "name" => "Phone", "customer_id" => 123 });
	/// ```
	pub fn new(model: &Model, attrs: impl Into<Lookups>) -> Self {
		Self::new_scoped(model, attrs.into(), None)
	}

	pub(crate) fn new_scoped(model: &Model, attrs: Lookups, scope: Option<RequestScope>) -> Self {
		let entity = Self::blank(model.clone(), scope);
		entity.set_initial_attrs(attrs);
		entity
	}

	fn blank(model: Model, scope: Option<RequestScope>) -> Self {
		Self {
			inner: Arc::new(Mutex::new(EntityState {
				model,
				original: Attrs::new(),
				current: Attrs::new(),
				persisted: false,
				related: HashMap::new(),
				collections: HashMap::new(),
				prefetch: None,
				scope,
			})),
		}
	}

	/// Build a persisted entity from a server record.
	pub(crate) fn materialize(
		model: &Model,
		record: Value,
		scope: Option<RequestScope>,
		prefetch: Option<Arc<PrefetchGroup>>,
	) -> Result<Self> {
		let attrs = record_attrs(model, Some(record))?;
		let entity = Self::blank(model.clone(), scope);
		entity.set_initial_attrs(attrs.into());
		{
			let mut state = entity.inner.lock();
			state.persisted = true;
			state.prefetch = prefetch;
		}
		Ok(entity)
	}

	/// Replace every attribute, dropping caches and pending changes.
	fn set_initial_attrs(&self, attrs: Lookups) {
		{
			let mut state = self.inner.lock();
			state.original.clear();
			state.current.clear();
			state.related.clear();
			state.collections.clear();
		}
		for (key, value) in attrs {
			self.set(&key, value);
		}
	}

	pub fn model(&self) -> Model {
		self.inner.lock().model.clone()
	}

	pub fn is_persisted(&self) -> bool {
		self.inner.lock().persisted
	}

	/// The request scope this entity issues its calls through.
	pub fn scope(&self) -> Option<RequestScope> {
		self.inner.lock().scope.clone()
	}

	/// The primary key; `None` until assigned.
	pub fn pk(&self) -> Option<Value> {
		match self.get("pk")? {
			FieldValue::Json(Value::Null) => None,
			FieldValue::Entity(entity) => entity.pk(),
			other => Some(other.to_param()),
		}
	}

	/// Snapshot of the current attributes.
	pub fn attrs(&self) -> IndexMap<String, FieldValue> {
		self.inner.lock().current.clone()
	}

	/// Snapshot of the baseline attributes.
	pub fn original_attrs(&self) -> IndexMap<String, FieldValue> {
		self.inner.lock().original.clone()
	}

	/// The record key backing attribute `name`.
	fn record_key(model: &Model, name: &str) -> String {
		if name == "pk" {
			return model.primary_key().to_string();
		}
		if let Some(field) = model.field(name) {
			return field.field_name().to_string();
		}
		if let Some(reference) = model.shadow_reference(name) {
			return reference.field_name().to_string();
		}
		name.to_string()
	}

	/// Read the raw stored value of attribute `name`.
	///
	/// A reference's `<name>_id` accessor reads the key without
	/// dereferencing: an entity value reads as its primary key.
	pub fn get(&self, name: &str) -> Option<FieldValue> {
		let (model, raw) = {
			let state = self.inner.lock();
			let key = Self::record_key(&state.model, name);
			(state.model.clone(), state.current.get(&key).cloned())
		};
		match model.shadow_reference(name) {
			Some(reference) if model.field(name).is_none() => {
				raw.and_then(|value| self.key_of(&reference, value))
					.map(FieldValue::Json)
			}
			_ => raw,
		}
	}

	/// The foreign key stored for the reference backed by record key `key`.
	pub(crate) fn reference_key(&self, key: &str) -> Option<Value> {
		let model = self.model();
		let reference = model
			.fields()
			.into_iter()
			.find(|field| field.is_reference() && (field.field_name() == key || field.name() == key));
		let raw = self.inner.lock().current.get(key).cloned()?;
		match reference {
			Some(reference) => self.key_of(&reference, raw),
			None => match raw {
				FieldValue::Json(Value::Null) => None,
				other => Some(other.to_param()),
			},
		}
	}

	fn key_of(&self, reference: &Field, value: FieldValue) -> Option<Value> {
		match value {
			FieldValue::Entity(entity) => entity.pk(),
			FieldValue::Json(Value::Null) => None,
			FieldValue::Json(Value::Object(record)) => {
				let primary_key = match reference.kind() {
					FieldKind::Reference { target, .. } => self
						.model()
						.registry()
						.ok()
						.and_then(|registry| registry.get(target))
						.map(|model| model.primary_key().to_string()),
					_ => None,
				}
				.unwrap_or_else(|| "id".to_string());
				record.get(&primary_key).cloned()
			}
			other => Some(other.to_param()),
		}
	}

	/// Write attribute `name`.
	///
	/// The first write of a key records the baseline; later writes only
	/// change the current value. Writing a reference drops its cached
	/// dereference. Writing an entity to a generic relation stores its
	/// content type and primary key.
	pub fn set(&self, name: &str, value: impl Into<FieldValue>) {
		let value = value.into();
		let model = self.model();

		if let Some(field) = model.field(name)
			&& let FieldKind::GenericRelation {
				content_type_field,
				object_id_field,
			} = field.kind()
			&& (value.as_entity().is_some() || value.is_null())
		{
			let (content_type, object_id) = match &value {
				FieldValue::Entity(target) => (
					target
						.model()
						.content_type()
						.map(|ct| Value::String(ct.to_string()))
						.unwrap_or(Value::Null),
					target.pk().unwrap_or(Value::Null),
				),
				_ => (Value::Null, Value::Null),
			};
			let mut state = self.inner.lock();
			for (key, value) in [
				(content_type_field, content_type),
				(object_id_field, object_id),
			] {
				state.original.insert(key.clone(), FieldValue::Json(value.clone()));
				state.current.insert(key.clone(), FieldValue::Json(value));
			}
			return;
		}

		let key = Self::record_key(&model, name);
		let cache_key = match model.shadow_reference(name) {
			Some(reference) if model.field(name).is_none() => reference.name().to_string(),
			_ => name.to_string(),
		};

		let mut state = self.inner.lock();
		state
			.original
			.entry(key.clone())
			.or_insert_with(|| value.clone());
		state.current.insert(key, value);
		state.related.remove(&cache_key);
	}

	/// Insert current values without touching the baseline.
	pub(crate) fn assign_current(&self, attrs: Params) {
		let mut state = self.inner.lock();
		for (key, value) in attrs {
			state.related.remove(&key);
			state.current.insert(key, FieldValue::Json(value));
		}
	}

	/// Attributes whose current value differs from the baseline.
	pub fn changes(&self) -> IndexMap<String, FieldValue> {
		let (original, current) = {
			let state = self.inner.lock();
			(state.original.clone(), state.current.clone())
		};
		current
			.into_iter()
			.filter(|(key, value)| original.get(key) != Some(value))
			.collect()
	}

	fn declared(&self, name: &str) -> Result<Field> {
		let model = self.model();
		model.field(name).ok_or_else(|| {
			Error::InvalidArgument(format!("{} has no field {}", model.name(), name))
		})
	}

	fn raw(&self, field: &Field) -> Option<FieldValue> {
		self.inner.lock().current.get(field.field_name()).cloned()
	}

	fn parse_with<T>(&self, name: &str, parse: fn(&str) -> Option<T>) -> Result<Option<T>> {
		let field = self.declared(name)?;
		let text = match self.raw(&field) {
			None | Some(FieldValue::Json(Value::Null)) => return Ok(None),
			Some(FieldValue::Json(Value::String(text))) => text,
			Some(FieldValue::Now) => FieldValue::Now.to_param().as_str().unwrap_or_default().to_string(),
			Some(other) => {
				return Err(Error::InvalidArgument(format!(
					"{}.{} holds {:?}, expected a string",
					self.model().name(),
					name,
					other
				)));
			}
		};
		if text.is_empty() {
			return Ok(None);
		}
		parse(&text).map(Some).ok_or_else(|| {
			Error::InvalidArgument(format!(
				"invalid {} value {:?} for {}.{}",
				field.type_name(),
				text,
				self.model().name(),
				name
			))
		})
	}

	/// Read a timestamp field. Naive timestamps are taken as UTC.
	pub fn datetime(&self, name: &str) -> Result<Option<DateTime<FixedOffset>>> {
		self.parse_with(name, parse_datetime)
	}

	pub fn date(&self, name: &str) -> Result<Option<NaiveDate>> {
		self.parse_with(name, parse_date)
	}

	pub fn time(&self, name: &str) -> Result<Option<NaiveTime>> {
		self.parse_with(name, parse_time)
	}

	pub fn file(&self, name: &str) -> Result<Option<FieldFile>> {
		let field = self.declared(name)?;
		Ok(self
			.raw(&field)
			.and_then(|value| value.as_str().map(String::from))
			.filter(|name| !name.is_empty())
			.map(FieldFile::new))
	}

	pub fn content_type(&self, name: &str) -> Result<Option<ContentTypeRef>> {
		let field = self.declared(name)?;
		Ok(self
			.raw(&field)
			.and_then(|value| value.as_str().map(String::from))
			.filter(|value| !value.is_empty())
			.map(ContentTypeRef::new))
	}

	fn cached_related(&self, name: &str) -> Option<Entity> {
		self.inner.lock().related.get(name).cloned()
	}

	fn cache_related(&self, name: &str, entity: &Entity) {
		self.inner
			.lock()
			.related
			.insert(name.to_string(), entity.clone());
	}

	/// Dereference a reference or a one-to-one reverse reference.
	///
	/// The target is fetched by primary key on first access and cached until
	/// the reference is written. Embedded records are materialized without a
	/// call. A null key reads as `None`.
	pub fn related(&self, name: &str) -> Result<Option<Entity>> {
		let field = self.declared(name)?;
		match field.kind() {
			FieldKind::Reference { target, .. } => {
				if let Some(cached) = self.cached_related(name) {
					return Ok(Some(cached));
				}
				let value = match self.raw(&field) {
					None | Some(FieldValue::Json(Value::Null)) => return Ok(None),
					Some(FieldValue::Entity(entity)) => return Ok(Some(entity)),
					Some(FieldValue::Now) => {
						return Err(Error::InvalidArgument(format!(
							"{}.{} cannot reference a timestamp",
							self.model().name(),
							name
						)));
					}
					Some(FieldValue::Json(value)) => value,
				};
				let target = self.model().registry()?.lookup(target)?;
				let entity = match value {
					record @ Value::Object(_) => {
						Entity::materialize(&target, record, self.scope(), None)?
					}
					pk => target
						.objects()
						.scoped(self.scope())
						.get(("pk", FieldValue::Json(pk)))?,
				};
				self.cache_related(name, &entity);
				Ok(Some(entity))
			}
			FieldKind::ReverseReference {
				target,
				field_name,
				filters,
				one_to_one: true,
			} => {
				if let Some(cached) = self.cached_related(name) {
					return Ok(Some(cached));
				}
				let target = self.model().registry()?.lookup(target)?;
				let mut lookups: Lookups = filters
					.iter()
					.map(|(key, value)| (key.clone(), value.clone()))
					.collect();
				lookups.insert(field_name.clone(), self.pk());
				let entity = target.objects().scoped(self.scope()).get(lookups)?;
				self.cache_related(name, &entity);
				Ok(Some(entity))
			}
			_ => Err(Error::InvalidArgument(format!(
				"{}.{} is not a single-valued relation",
				self.model().name(),
				name
			))),
		}
	}

	/// The queryset of a one-to-many reverse reference.
	///
	/// When this entity was materialized by a queryset prefetching `name`,
	/// the records of all its siblings are fetched with a single request on
	/// first access and split locally.
	pub fn related_set(&self, name: &str) -> Result<QuerySet> {
		let field = self.declared(name)?;
		let FieldKind::ReverseReference {
			target,
			field_name,
			filters,
			one_to_one: false,
		} = field.kind()
		else {
			return Err(Error::InvalidArgument(format!(
				"{}.{} is not a one-to-many relation",
				self.model().name(),
				name
			)));
		};

		let target = self.model().registry()?.lookup(target)?;
		let (prefetch, scope) = {
			let state = self.inner.lock();
			(state.prefetch.clone(), state.scope.clone())
		};
		let filters: Lookups = filters
			.iter()
			.map(|(key, value)| (key.clone(), value.clone()))
			.collect();

		if let Some(group) = prefetch
			&& group.prefetches(name)
		{
			return QuerySet::prefetched_view(
				&group,
				name,
				&target,
				field_name,
				filters,
				self.pk().unwrap_or(Value::Null),
				scope,
			);
		}

		let mut lookups = filters;
		lookups.insert(field_name.clone(), self.pk());
		Ok(QuerySet::new(target).scoped(scope).filter(lookups))
	}

	/// Resolve a generic relation through the registry's content types.
	pub fn generic(&self, name: &str) -> Result<Option<Entity>> {
		let field = self.declared(name)?;
		let FieldKind::GenericRelation {
			content_type_field,
			object_id_field,
		} = field.kind()
		else {
			return Err(Error::InvalidArgument(format!(
				"{}.{} is not a generic relation",
				self.model().name(),
				name
			)));
		};

		let (content_type, object_id) = {
			let state = self.inner.lock();
			(
				state.current.get(content_type_field).cloned(),
				state.current.get(object_id_field).cloned(),
			)
		};
		let content_type = match content_type {
			None | Some(FieldValue::Json(Value::Null)) => return Ok(None),
			Some(value) => value.as_str().map(String::from).ok_or_else(|| {
				Error::InvalidArgument(format!("{}.{} is not a string", name, content_type_field))
			})?,
		};
		let model = self
			.model()
			.registry()?
			.by_content_type(&content_type)
			.ok_or_else(|| {
				Error::InvalidArgument(format!(
					"no model registered for content type {}",
					content_type
				))
			})?;
		let object_id = object_id.unwrap_or_else(FieldValue::null);
		model
			.objects()
			.scoped(self.scope())
			.get(("pk", object_id))
			.map(Some)
	}

	/// Read attribute `name` through its field.
	pub fn resolve(&self, name: &str) -> Result<Resolved> {
		let Some(field) = self.model().field(name) else {
			return Ok(Resolved::Value(self.get(name)));
		};
		Ok(match field.kind() {
			FieldKind::Plain => Resolved::Value(self.get(name)),
			FieldKind::DateTime => Resolved::DateTime(self.datetime(name)?),
			FieldKind::Date => Resolved::Date(self.date(name)?),
			FieldKind::Time => Resolved::Time(self.time(name)?),
			FieldKind::File => Resolved::File(self.file(name)?),
			FieldKind::ContentType => Resolved::ContentType(self.content_type(name)?),
			FieldKind::Reference { .. } => Resolved::Entity(self.related(name)?),
			FieldKind::ReverseReference {
				one_to_one: true, ..
			} => Resolved::Entity(self.related(name)?),
			FieldKind::ReverseReference { .. } => Resolved::QuerySet(self.related_set(name)?),
			FieldKind::GenericRelation { .. } => Resolved::Entity(self.generic(name)?),
		})
	}

	/// Persist the entity.
	///
	/// Unsaved entities are created with every current attribute; persisted
	/// entities send only their changes. The server response becomes the new
	/// baseline and current state.
	pub fn save(&self) -> Result<()> {
		self.save_inner(None)
	}

	/// Persist only the changes among `update_fields`.
	///
	/// Only those attributes are refreshed from the response; other local
	/// edits stay pending.
	pub fn save_fields(&self, update_fields: &[&str]) -> Result<()> {
		self.save_inner(Some(update_fields))
	}

	fn save_inner(&self, update_fields: Option<&[&str]>) -> Result<()> {
		let (model, persisted, scope) = {
			let state = self.inner.lock();
			(state.model.clone(), state.persisted, state.scope.clone())
		};

		if !persisted {
			let data = payload(&self.attrs());
			let request = RestRequest::post(model.resources_url()?).with_data(data);
			let record = record_attrs(&model, model.rest_call(&request, scope.as_ref())?)?;

			let mut state = self.inner.lock();
			state.original = record.clone();
			state.current = record;
			state.persisted = true;
			return Ok(());
		}

		let pk = self.persisted_pk(&model)?;
		let mut changes = self.changes();
		let keys: Option<Vec<String>> = update_fields.map(|fields| {
			fields
				.iter()
				.map(|name| Self::record_key(&model, name))
				.collect()
		});
		if let Some(keys) = &keys {
			changes.retain(|key, _| keys.contains(key));
		}

		let request = RestRequest::patch(model.resource_url(&pk)?).with_data(payload(&changes));
		let record = record_attrs(&model, model.rest_call(&request, scope.as_ref())?)?;

		let mut state = self.inner.lock();
		match keys {
			Some(keys) => {
				for key in keys {
					if let Some(value) = record.get(&key) {
						state.current.insert(key, value.clone());
					}
				}
				state.original = record;
			}
			None => {
				state.original = record.clone();
				state.current = record;
			}
		}
		Ok(())
	}

	fn persisted_pk(&self, model: &Model) -> Result<Value> {
		self.pk().ok_or_else(|| {
			Error::InvalidArgument(format!("persisted {} has no primary key", model.name()))
		})
	}

	/// Delete the entity on the server.
	pub fn delete(&self) -> Result<Option<Value>> {
		if !self.is_persisted() {
			return Err(Error::NotPersisted(
				"It doesn't make sense to delete non-persisted instances".to_string(),
			));
		}
		let model = self.model();
		let pk = self.persisted_pk(&model)?;
		let request = RestRequest::delete(model.resource_url(&pk)?);
		model.rest_call(&request, self.scope().as_ref())
	}

	/// Reload every attribute from the server.
	///
	/// Bypasses the request scope, drops cached dereferences and discards
	/// pending changes.
	pub fn refresh_from_db(&self) -> Result<()> {
		if !self.is_persisted() {
			return Err(Error::NotPersisted(
				"It doesn't make sense to refresh non-persisted instances".to_string(),
			));
		}
		let model = self.model();
		let pk = self.persisted_pk(&model)?;
		let request = RestRequest::get(model.resource_url(&pk)?);
		let record = record_attrs(&model, model.rest_call(&request, None)?)?;
		self.set_initial_attrs(record.into());
		Ok(())
	}

	/// Call a subresource method of this entity.
	pub fn call(&self, name: &str, kwargs: impl Into<Lookups>) -> Result<MethodOutput> {
		let model = self.model();
		let method = model.method(name).ok_or_else(|| {
			Error::InvalidArgument(format!("{} has no method {}", model.name(), name))
		})?;
		method.invoke(&model, Some(self), kwargs.into(), self.scope())
	}

	/// The entities listed by a collection method, cached per entity.
	pub fn collection(&self, name: &str) -> Result<Vec<Entity>> {
		if let Some(cached) = self.inner.lock().collections.get(name) {
			return Ok(cached.clone());
		}
		let entities = match self.call(name, Lookups::new())? {
			MethodOutput::Entities(entities) => entities,
			_ => {
				return Err(Error::InvalidArgument(format!(
					"{} is not a collection method",
					name
				)));
			}
		};
		self.inner
			.lock()
			.collections
			.insert(name.to_string(), entities.clone());
		Ok(entities)
	}
}

/// Normalize attributes into a write payload.
pub(crate) fn payload(attrs: &IndexMap<String, FieldValue>) -> Params {
	attrs
		.iter()
		.map(|(key, value)| (key.clone(), value.to_payload()))
		.collect()
}

/// Interpret a response body as a record of `model`.
fn record_attrs(model: &Model, body: Option<Value>) -> Result<Attrs> {
	match body {
		Some(Value::Object(record)) => Ok(record
			.into_iter()
			.map(|(key, value)| (key, FieldValue::Json(value)))
			.collect()),
		other => Err(Error::UnexpectedResponse(format!(
			"expected a {} record, got {}",
			model.name(),
			other.unwrap_or(Value::Null)
		))),
	}
}

impl PartialEq for Entity {
	fn eq(&self, other: &Self) -> bool {
		if Arc::ptr_eq(&self.inner, &other.inner) {
			return true;
		}
		match (self.pk(), other.pk()) {
			(Some(a), Some(b)) => a == b && self.model() == other.model(),
			_ => false,
		}
	}
}

impl fmt::Debug for Entity {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let (name, current) = {
			let state = self.inner.lock();
			(state.model.name().to_string(), state.current.clone())
		};
		write!(f, "{}({:?})", name, current)
	}
}
