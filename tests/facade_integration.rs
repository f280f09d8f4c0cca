//! Facade integration tests
//!
//! Drives the re-exported prelude end to end against a mocked REST API.

use rest_orm::prelude::*;
use rest_orm_mocks::{MockTransport, page};
use rstest::rstest;
use serde_json::json;
use std::sync::Arc;

/// Test: register, look up, create through a reference and walk the reverse set
#[rstest]
fn test_prelude_round_trip() {
	let mock = MockTransport::new();
	let registry = Registry::new(
		Arc::new(mock.clone()),
		ClientSettings::default().with_default_base_url("http://example.org"),
	);
	let customer = ModelBuilder::new("Customer")
		.resource("customers")
		.register(&registry)
		.unwrap();
	let device = ModelBuilder::new("Device")
		.resource("devices")
		.field(Field::reference("customer", "Customer").related_name("devices"))
		.register(&registry)
		.unwrap();
	registry.finalize().unwrap();

	mock.push_json(page(vec![json!({"id": 1, "name": "ACME"})]));
	mock.push_json(json!({"id": 7, "name": "Phone", "customer": 1}));
	mock.push_json(page(vec![json!({"id": 7, "name": "Phone", "customer": 1})]));

	let acme = customer.objects().get(("name", "ACME")).unwrap();
	let phone = device
		.objects()
		.create(lookups! { "name" => "Phone", "customer" => &acme })
		.unwrap();
	let devices = acme.related_set("devices").unwrap().to_vec().unwrap();

	assert_eq!(phone.pk(), Some(json!(7)));
	assert_eq!(devices, vec![phone]);
	let requests = mock.requests();
	assert_eq!(requests[1].method, Method::Post);
	assert_eq!(requests[2].url, "http://example.org/devices/");
	assert_eq!(requests[2].params.get("customer"), Some(&json!(1)));
}

/// Test: the shortcut re-exports map a lookup miss to NotFound
#[cfg(feature = "shortcuts")]
#[rstest]
fn test_shortcuts_reexported() {
	let mock = MockTransport::new();
	let registry = Registry::new(
		Arc::new(mock.clone()),
		ClientSettings::default().with_default_base_url("http://example.org"),
	);
	let customer = ModelBuilder::new("Customer")
		.resource("customers")
		.register(&registry)
		.unwrap();
	mock.push_json(page(vec![]));

	let result = get_object_or_404(&customer.objects(), ("name", "nobody"));

	assert!(matches!(result, Err(GetError::NotFound(_))));
}
