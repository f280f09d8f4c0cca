//! Process-wide registry integration tests
//!
//! These share [`Registry::global`], so they run serially.

use rest_orm_db::orm::{Field, ModelBuilder, Registry};
use rest_orm_mocks::{MockTransport, page};
use serde_json::json;
use serial_test::serial;
use std::sync::Arc;

/// Test: models registered globally resolve each other after finalize
#[test]
#[serial(global_registry)]
fn test_global_registry_round_trip() {
	let mock = MockTransport::returning(page(vec![json!({"id": 1, "owner": 2})]));
	let registry = Registry::global();
	registry.set_transport(Arc::new(mock.clone()));

	ModelBuilder::new("GlobalOwner")
		.resource("owners")
		.base_url("http://example.org")
		.register(registry)
		.unwrap();
	let pet = ModelBuilder::new("GlobalPet")
		.resource("pets")
		.base_url("http://example.org")
		.field(Field::reference("owner", "GlobalOwner").related_name("pets"))
		.register(registry)
		.unwrap();
	registry.finalize().unwrap();

	let pets = pet.objects().to_vec().unwrap();

	assert_eq!(pets.len(), 1);
	assert!(registry.lookup("GlobalOwner").unwrap().field("pets").is_some());
	assert_eq!(mock.last_request().unwrap().url, "http://example.org/pets/");
}

/// Test: the global registry hands out the same instance
#[test]
#[serial(global_registry)]
fn test_global_registry_is_shared() {
	ModelBuilder::new("GlobalShared")
		.resource("shared")
		.register(Registry::global())
		.unwrap();

	assert!(Registry::global().get("GlobalShared").is_some());
}
