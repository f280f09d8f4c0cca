//! Entity integration tests
//!
//! Saving, change tracking, typed attributes and deletion against a mocked
//! REST API.

mod common;

use common::{Api, api, data};
use rest_orm_core::{Error, Method, RestResponse};
use rest_orm_db::{Entity, FieldValue, lookups};
use rstest::rstest;
use serde_json::json;

/// Test: saving a new entity POSTs every attribute and adopts the response
#[rstest]
fn test_save_populates_pk(api: Api) {
	api.mock.push_json(json!({"id": 123, "name": "Smith"}));
	let customer = Entity::new(&api.customer, ("name", "Smith"));
	assert!(!customer.is_persisted());

	customer.save().unwrap();

	let request = api.mock.last_request().unwrap();
	assert_eq!(request.method, Method::Post);
	assert_eq!(request.url, "http://example.org/customers/");
	assert_eq!(request.data, data(json!({"name": "Smith"})));
	assert!(customer.is_persisted());
	assert_eq!(customer.pk(), Some(json!(123)));
}

/// Test: a persisted entity PATCHes only its changes
#[rstest]
fn test_save_sends_changes_only(api: Api) {
	api.mock
		.push_json(json!({"id": 123, "name": "Smith", "email": "smith@example.org"}));
	api.mock
		.push_json(json!({"id": 123, "name": "Jones", "email": "smith@example.org"}));
	let customer = api.customer.objects().get(("pk", 123)).unwrap();

	customer.set("name", "Jones");
	assert_eq!(
		customer.changes().keys().collect::<Vec<_>>(),
		vec!["name"]
	);
	customer.save().unwrap();

	let request = api.mock.last_request().unwrap();
	assert_eq!(request.method, Method::Patch);
	assert_eq!(request.url, "http://example.org/customers/123/");
	assert_eq!(request.data, data(json!({"name": "Jones"})));
	assert!(customer.changes().is_empty());
}

/// Test: save_fields only sends the named changes
#[rstest]
fn test_save_fields(api: Api) {
	api.mock.push_json(json!({"id": 1, "name": "Smith", "email": "a@b"}));
	api.mock.push_json(json!({"id": 1, "name": "Jones", "email": "a@b"}));
	let customer = api.customer.objects().get(("pk", 1)).unwrap();

	customer.set("name", "Jones");
	customer.set("email", "c@d");
	customer.save_fields(&["name"]).unwrap();

	assert_eq!(
		api.mock.last_request().unwrap().data,
		data(json!({"name": "Jones"}))
	);
	assert_eq!(customer.get("email"), Some(FieldValue::from("c@d")));
	assert_eq!(customer.changes().keys().collect::<Vec<_>>(), vec!["email"]);
}

/// Test: changing a reference PATCHes the new key
#[rstest]
fn test_reference_change(api: Api) {
	api.mock
		.push_json(json!({"id": 1, "customer": 123, "type": "phone"}));
	api.mock
		.push_json(json!({"id": 1, "customer": 456, "type": "phone"}));
	let device = api.device.objects().get(("pk", 1)).unwrap();

	let other = Entity::new(&api.customer, lookups! { "id" => 456, "name" => "different" });
	device.set("customer", &other);
	device.save().unwrap();

	let request = api.mock.last_request().unwrap();
	assert_eq!(request.url, "http://example.org/devices/1/");
	assert_eq!(request.data, data(json!({"customer": 456})));
}

/// Test: an unsaved reference is sent with the key it has at save time
#[rstest]
fn test_unsaved_reference_saved_later(api: Api) {
	api.mock.push_json(json!({"id": 123, "name": "Smith"}));
	api.mock.push_json(json!({"id": 1, "customer": 123}));
	let customer = Entity::new(&api.customer, ("name", "Smith"));
	let device = Entity::new(&api.device, ("customer", &customer));

	customer.save().unwrap();
	device.save().unwrap();

	assert_eq!(
		api.mock.last_request().unwrap().data,
		data(json!({"customer": 123}))
	);
}

/// Test: the _id accessor writes and reads the raw key
#[rstest]
fn test_reference_id_accessor(api: Api) {
	let device = Entity::new(&api.device, ("customer_id", 123));

	assert_eq!(device.get("customer_id"), Some(FieldValue::from(123)));
	assert_eq!(device.attrs().get("customer"), Some(&FieldValue::from(123)));
}

/// Test: mappings are sent as JSON strings and in-place edits are saved
#[rstest]
fn test_mutable_mapping(api: Api) {
	api.mock
		.push_json(json!({"id": 123, "characteristics": {"key": "old_value"}}));
	api.mock
		.push_json(json!({"id": 123, "characteristics": {"key": "new_value"}}));
	let customer = Entity::new(
		&api.customer,
		lookups! { "pk" => 123, "characteristics" => json!({"key": "old_value"}) },
	);

	customer.save().unwrap();
	assert_eq!(
		api.mock.last_request().unwrap().data,
		data(json!({"id": 123, "characteristics": r#"{"key":"old_value"}"#}))
	);

	let mut characteristics = customer
		.get("characteristics")
		.and_then(|value| value.as_json().cloned())
		.unwrap();
	characteristics["key"] = json!("new_value");
	customer.set("characteristics", characteristics);
	customer.save().unwrap();

	let request = api.mock.last_request().unwrap();
	assert_eq!(request.method, Method::Patch);
	assert_eq!(
		request.data,
		data(json!({"characteristics": r#"{"key":"new_value"}"#}))
	);
}

/// Test: typed readers parse timestamps and files lazily
#[rstest]
fn test_typed_attributes(api: Api) {
	api.mock.push_json(json!({
		"id": 1,
		"created_at": "2020-05-17T10:30:00",
	}));
	api.mock.push_json(json!({
		"id": 2,
		"image": "http://cdn.example.org/phone.png",
	}));

	let customer = api.customer.objects().get(("pk", 1)).unwrap();
	let device = api.device.objects().get(("pk", 2)).unwrap();

	let created_at = customer.datetime("created_at").unwrap().unwrap();
	assert_eq!(created_at.to_rfc3339(), "2020-05-17T10:30:00+00:00");
	let image = device.file("image").unwrap().unwrap();
	assert_eq!(image.url(), "http://cdn.example.org/phone.png");
}

/// Test: an unparseable timestamp is an error on read
#[rstest]
fn test_invalid_datetime(api: Api) {
	let customer = Entity::new(&api.customer, ("created_at", "yesterday"));

	assert!(matches!(
		customer.datetime("created_at"),
		Err(Error::InvalidArgument(_))
	));
}

/// Test: the now() sentinel is sent as a timestamp
#[rstest]
fn test_now_sentinel(api: Api) {
	api.mock.push_json(json!({"id": 1}));
	let customer = Entity::new(&api.customer, ("created_at", FieldValue::now()));

	assert!(customer.datetime("created_at").unwrap().is_some());
	customer.save().unwrap();

	let payload = api.mock.last_request().unwrap().data.unwrap();
	let sent = payload.get("created_at").and_then(|value| value.as_str()).unwrap();
	assert!(rest_orm_db::orm::fields::parse_datetime(sent).is_some());
}

/// Test: deleting a persisted entity sends DELETE to its resource URL
#[rstest]
fn test_delete(api: Api) {
	api.mock.push_json(json!({"id": 5}));
	api.mock.push_response(RestResponse::no_content());
	let customer = api.customer.objects().get(("pk", 5)).unwrap();

	customer.delete().unwrap();

	let request = api.mock.last_request().unwrap();
	assert_eq!(request.method, Method::Delete);
	assert_eq!(request.url, "http://example.org/customers/5/");
}

/// Test: unsaved entities cannot be deleted or refreshed
#[rstest]
fn test_not_persisted(api: Api) {
	let customer = Entity::new(&api.customer, ("name", "Smith"));

	let delete = customer.delete().unwrap_err();
	let refresh = customer.refresh_from_db().unwrap_err();

	assert_eq!(
		delete.to_string(),
		"It doesn't make sense to delete non-persisted instances"
	);
	assert!(matches!(refresh, Error::NotPersisted(_)));
	assert_eq!(api.mock.call_count(), 0);
}

/// Test: status codes map onto error variants
#[rstest]
#[case(400, "BadRequest")]
#[case(409, "Conflict")]
#[case(502, "BadGateway")]
#[case(503, "Server")]
fn test_save_errors(api: Api, #[case] status: u16, #[case] variant: &str) {
	api.mock
		.push_response(RestResponse::new(status, r#"{"detail": "nope"}"#));
	let customer = Entity::new(&api.customer, ("name", "Smith"));

	let error = customer.save().unwrap_err();

	let matched = match error {
		Error::BadRequest(_) => "BadRequest",
		Error::Conflict(_) => "Conflict",
		Error::BadGateway(_) => "BadGateway",
		Error::Server(_) => "Server",
		_ => "other",
	};
	assert_eq!(matched, variant);
	assert!(!customer.is_persisted());
}

/// Test: a transport failure surfaces unchanged
#[rstest]
fn test_transport_failure(api: Api) {
	api.mock.set_fail_next("connection refused");

	let result = api.customer.objects().to_vec();

	assert!(matches!(result, Err(Error::Transport(_))));
}

/// Test: equality follows model and primary key
#[rstest]
fn test_entity_equality(api: Api) {
	let first = Entity::new(&api.customer, ("id", 1));
	let same = Entity::new(&api.customer, ("id", 1));
	let device = Entity::new(&api.device, ("id", 1));
	let unsaved = Entity::new(&api.customer, ("name", "Smith"));
	let other_unsaved = Entity::new(&api.customer, ("name", "Smith"));

	assert_eq!(first, same);
	assert_ne!(first, device);
	assert_ne!(unsaved, other_unsaved);
	assert_eq!(unsaved, unsaved.clone());
}
