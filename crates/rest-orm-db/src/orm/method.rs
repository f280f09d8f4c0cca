//! Subresource routes of a model.
//!
//! A [`RemoteMethod`] addresses `/{resource}/{pk}/{subresource}/` on an
//! entity, or `/{resource}/{subresource}/` when static, as exposed by
//! detail and list routes on the server.

use super::entity::{Entity, payload};
use super::model::Model;
use super::value::Lookups;
use rest_orm_core::{Error, Method, RequestScope, RestRequest, Result};
use serde_json::Value;

/// A declared subresource route.
///
/// ```rust,ignore
/// ModelBuilder::new("Customer")
///     .method(RemoteMethod::new("activate", Method::Post))
///     .method(RemoteMethod::new("newest", Method::Get).static_route().model("Customer"))
///     .method(RemoteMethod::collection("devices", "Device"))
/// ```
#[derive(Debug, Clone)]
pub struct RemoteMethod {
	name: String,
	subresource: String,
	http_method: Method,
	is_static: bool,
	unwrapping_key: Option<String>,
	model: Option<String>,
	returns_collection: bool,
}

/// The result of a method call.
#[derive(Debug, Clone)]
pub enum MethodOutput {
	/// The decoded body; `None` when empty.
	Json(Option<Value>),
	/// The body materialized as the method's model.
	Entity(Entity),
	/// Every item of a listed body, materialized.
	Entities(Vec<Entity>),
}

impl MethodOutput {
	pub fn into_json(self) -> Option<Value> {
		match self {
			MethodOutput::Json(value) => value,
			_ => None,
		}
	}

	pub fn into_entity(self) -> Option<Entity> {
		match self {
			MethodOutput::Entity(entity) => Some(entity),
			_ => None,
		}
	}
}

impl RemoteMethod {
	/// A route named after its subresource.
	pub fn new(subresource: impl Into<String>, http_method: Method) -> Self {
		let subresource = subresource.into();
		Self {
			name: subresource.clone(),
			subresource,
			http_method,
			is_static: false,
			unwrapping_key: None,
			model: None,
			returns_collection: false,
		}
	}

	/// A GET route listing entities of `model`, cached per entity.
	pub fn collection(subresource: impl Into<String>, model: impl Into<String>) -> Self {
		let mut method = Self::new(subresource, Method::Get).model(model);
		method.returns_collection = true;
		method
	}

	/// Call the route under another name.
	pub fn named(mut self, name: impl Into<String>) -> Self {
		self.name = name.into();
		self
	}

	/// Address the collection rather than an entity.
	pub fn static_route(mut self) -> Self {
		self.is_static = true;
		self
	}

	/// Read the result from this key of the response body.
	pub fn unwrapping_key(mut self, key: impl Into<String>) -> Self {
		self.unwrapping_key = Some(key.into());
		self
	}

	/// Materialize the result as an entity of `model`.
	pub fn model(mut self, model: impl Into<String>) -> Self {
		self.model = Some(model.into());
		self
	}

	pub fn name(&self) -> &str {
		&self.name
	}

	pub fn subresource(&self) -> &str {
		&self.subresource
	}

	pub fn is_static(&self) -> bool {
		self.is_static
	}

	pub fn returns_collection(&self) -> bool {
		self.returns_collection
	}

	pub(crate) fn invoke(
		&self,
		model: &Model,
		owner: Option<&Entity>,
		kwargs: Lookups,
		scope: Option<RequestScope>,
	) -> Result<MethodOutput> {
		let base = match (self.is_static, owner) {
			(true, _) => model.resources_url()?,
			(false, Some(owner)) => {
				let pk = owner.pk().ok_or_else(|| {
					Error::NotPersisted(format!(
						"{}.{} needs a saved {}",
						model.name(),
						self.name,
						model.name()
					))
				})?;
				model.resource_url(&pk)?
			}
			(false, None) => {
				return Err(Error::InvalidArgument(format!(
					"{}.{} must be called on an entity",
					model.name(),
					self.name
				)));
			}
		};
		let url = format!("{}{}/", base, self.subresource);

		let arguments = payload(&kwargs.into_inner());
		let request = match self.http_method {
			Method::Post => RestRequest::new(Method::Post, url).with_data(arguments),
			method => RestRequest::new(method, url).with_params(arguments),
		};
		let mut body = model.rest_call(&request, scope.as_ref())?;

		if let Some(key) = &self.unwrapping_key {
			body = match body {
				Some(Value::Object(mut object)) => object.remove(key),
				_ => None,
			};
		}

		let Some(target) = &self.model else {
			return Ok(MethodOutput::Json(body));
		};
		let target = model.registry()?.lookup(target)?;

		if self.returns_collection {
			let items = match body {
				Some(Value::Array(items)) => items,
				Some(other) => {
					return Err(Error::UnexpectedResponse(format!(
						"{} expected a list, got {}",
						self.name, other
					)));
				}
				None => Vec::new(),
			};
			return items
				.into_iter()
				.map(|item| Entity::materialize(&target, item, scope.clone(), None))
				.collect::<Result<Vec<_>>>()
				.map(MethodOutput::Entities);
		}

		match body {
			Some(record) => {
				Entity::materialize(&target, record, scope, None).map(MethodOutput::Entity)
			}
			None => Err(Error::UnexpectedResponse(format!(
				"{} returned no {} record",
				self.name,
				target.name()
			))),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_builder_defaults() {
		let method = RemoteMethod::new("activate", Method::Post);

		assert_eq!(method.name(), "activate");
		assert!(!method.is_static());
		assert!(!method.returns_collection());
	}

	#[test]
	fn test_collection_route() {
		let method = RemoteMethod::collection("devices", "Device").named("all_devices");

		assert_eq!(method.name(), "all_devices");
		assert_eq!(method.subresource(), "devices");
		assert!(method.returns_collection());
	}
}
