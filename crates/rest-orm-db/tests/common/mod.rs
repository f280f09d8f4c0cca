//! Shared fixtures for rest-orm-db integration tests

#![allow(dead_code)]

use rest_orm_conf::ClientSettings;
use rest_orm_core::Params;
use rest_orm_db::orm::{Field, Method, Model, ModelBuilder, Registry, RemoteMethod};
use rest_orm_mocks::MockTransport;
use rstest::fixture;
use serde_json::Value;
use std::sync::Arc;

/// A registry of the customer/device models served by a mock transport.
pub struct Api {
	pub mock: MockTransport,
	pub registry: Registry,
	pub customer: Model,
	pub device: Model,
	pub request: Model,
	pub comment: Model,
}

#[fixture]
pub fn api() -> Api {
	let mock = MockTransport::new();
	let registry = Registry::new(Arc::new(mock.clone()), ClientSettings::default());

	let customer = ModelBuilder::new("Customer")
		.resource("customers")
		.base_url("http://example.org")
		.get_latest_by("created_at")
		.content_type("crm_customer")
		.field(Field::datetime("created_at"))
		.method(RemoteMethod::new("activate", Method::Post))
		.method(
			RemoteMethod::new("newest", Method::Get)
				.static_route()
				.unwrapping_key("customer")
				.model("Customer"),
		)
		.method(RemoteMethod::collection("history", "Device"))
		.register(&registry)
		.unwrap();
	let device = ModelBuilder::new("Device")
		.resource("devices")
		.base_url("http://example.org")
		.field(Field::reference("customer", "Customer").related_name("devices"))
		.field(Field::file("image"))
		.register(&registry)
		.unwrap();
	let request = ModelBuilder::new("Request")
		.resource("requests")
		.base_url("http://example.org")
		.manager(|queryset| queryset.order_by(&["created_at"]))
		.register(&registry)
		.unwrap();
	let comment = ModelBuilder::new("Comment")
		.resource("comments")
		.base_url("http://example.org")
		.field(Field::content_type("content_type"))
		.field(Field::generic_relation("target", "content_type", "object_id"))
		.register(&registry)
		.unwrap();
	registry.finalize().unwrap();

	Api {
		mock,
		registry,
		customer,
		device,
		request,
		comment,
	}
}

/// Build request params from a JSON object.
pub fn params(value: Value) -> Params {
	match value {
		Value::Object(map) => map.into_iter().collect(),
		other => panic!("expected an object, got {}", other),
	}
}

/// Build a write payload from a JSON object.
pub fn data(value: Value) -> Option<Params> {
	Some(params(value))
}
