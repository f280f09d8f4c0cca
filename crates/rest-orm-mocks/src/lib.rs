//! Mock transport for testing code built on rest-orm.
//!
//! [`MockTransport`] records every request and answers from, in order:
//!
//! 1. a pending failure set with [`MockTransport::set_fail_next`]
//! 2. a response routed to the exact request URL
//! 3. the FIFO queue of pushed responses
//! 4. the fixed return value
//!
//! Clones share their state, so a test can keep a handle while the registry
//! owns another.

use indexmap::IndexMap;
use parking_lot::Mutex;
use rest_orm_core::{Error, Method, RestRequest, RestResponse, Result, Transport};
use serde_json::{Value, json};
use std::collections::VecDeque;
use std::sync::Arc;

/// Recording transport with scripted responses.
#[derive(Clone, Default)]
pub struct MockTransport {
	requests: Arc<Mutex<Vec<RestRequest>>>,
	queue: Arc<Mutex<VecDeque<RestResponse>>>,
	routes: Arc<Mutex<IndexMap<String, RestResponse>>>,
	return_value: Arc<Mutex<Option<RestResponse>>>,
	fail_next: Arc<Mutex<Option<String>>>,
}

impl MockTransport {
	/// Creates a mock without any configured response.
	pub fn new() -> Self {
		Self::default()
	}

	/// Creates a mock answering every call with `value`.
	pub fn returning(value: Value) -> Self {
		let mock = Self::new();
		mock.set_return_value(value);
		mock
	}

	/// Answers every unrouted, unqueued call with `value`.
	pub fn set_return_value(&self, value: Value) {
		*self.return_value.lock() = Some(RestResponse::json(&value));
	}

	/// Answers every unrouted, unqueued call with `response`.
	pub fn set_return_response(&self, response: RestResponse) {
		*self.return_value.lock() = Some(response);
	}

	/// Queues a JSON response for the next unrouted call.
	pub fn push_json(&self, value: Value) {
		self.push_response(RestResponse::json(&value));
	}

	/// Queues a raw response for the next unrouted call.
	pub fn push_response(&self, response: RestResponse) {
		self.queue.lock().push_back(response);
	}

	/// Answers every call to exactly `url` with `value`.
	pub fn route(&self, url: impl Into<String>, value: Value) {
		self.routes.lock().insert(url.into(), RestResponse::json(&value));
	}

	/// Configures the next call to fail with a transport error.
	pub fn set_fail_next(&self, message: impl Into<String>) {
		*self.fail_next.lock() = Some(message.into());
	}

	/// Every request executed so far, oldest first.
	pub fn requests(&self) -> Vec<RestRequest> {
		self.requests.lock().clone()
	}

	pub fn call_count(&self) -> usize {
		self.requests.lock().len()
	}

	pub fn last_request(&self) -> Option<RestRequest> {
		self.requests.lock().last().cloned()
	}

	/// Requests issued with `method`.
	pub fn requests_with(&self, method: Method) -> Vec<RestRequest> {
		self.requests
			.lock()
			.iter()
			.filter(|request| request.method == method)
			.cloned()
			.collect()
	}

	/// Forgets recorded requests, keeping configured responses.
	pub fn reset_calls(&self) {
		self.requests.lock().clear();
	}
}

impl Transport for MockTransport {
	fn execute(&self, request: &RestRequest) -> Result<RestResponse> {
		self.requests.lock().push(request.clone());

		if let Some(message) = self.fail_next.lock().take() {
			return Err(Error::Transport(message));
		}
		if let Some(response) = self.routes.lock().get(&request.url) {
			return Ok(response.clone());
		}
		if let Some(response) = self.queue.lock().pop_front() {
			return Ok(response);
		}
		self.return_value.lock().clone().ok_or_else(|| {
			Error::Transport(format!(
				"no mock response configured for {} {}",
				request.method, request.url
			))
		})
	}
}

/// A single page of a limit/offset paginated listing.
pub fn page(results: Vec<Value>) -> Value {
	let count = results.len();
	paginated(results, count, None)
}

/// A page of a listing holding `count` records in total.
pub fn paginated(results: Vec<Value>, count: usize, next: Option<&str>) -> Value {
	json!({
		"count": count,
		"next": next,
		"previous": null,
		"results": results,
	})
}

#[cfg(test)]
mod tests {
	use super::*;
	use rstest::rstest;

	#[rstest]
	fn test_answer_precedence() {
		let mock = MockTransport::returning(json!({"fallback": true}));
		mock.push_json(json!({"queued": true}));
		mock.route("http://example.org/a/", json!({"routed": true}));

		let routed = mock.execute(&RestRequest::get("http://example.org/a/")).unwrap();
		let queued = mock.execute(&RestRequest::get("http://example.org/b/")).unwrap();
		let fallback = mock.execute(&RestRequest::get("http://example.org/b/")).unwrap();

		assert_eq!(routed.json_body().unwrap(), Some(json!({"routed": true})));
		assert_eq!(queued.json_body().unwrap(), Some(json!({"queued": true})));
		assert_eq!(fallback.json_body().unwrap(), Some(json!({"fallback": true})));
		assert_eq!(mock.call_count(), 3);
	}

	#[rstest]
	fn test_fail_next_applies_once() {
		let mock = MockTransport::returning(json!({}));
		mock.set_fail_next("connection refused");

		assert!(mock.execute(&RestRequest::get("http://example.org/")).is_err());
		assert!(mock.execute(&RestRequest::get("http://example.org/")).is_ok());
	}

	#[rstest]
	fn test_unconfigured_mock_errors() {
		let mock = MockTransport::new();

		assert!(matches!(
			mock.execute(&RestRequest::post("http://example.org/")),
			Err(Error::Transport(_))
		));
	}
}
