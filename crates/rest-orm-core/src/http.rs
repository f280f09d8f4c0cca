//! REST requests, responses and transports.
//!
//! A [`Transport`] executes one [`RestRequest`] and returns the raw
//! [`RestResponse`]. [`rest_call`] wraps a transport with the pipeline every
//! model call goes through: null-argument validation, the request-scope
//! cache, status mapping and JSON decoding.

use crate::cache::RequestScope;
use crate::exception::{Error, ErrorResponse, Result};
use crate::querystring::{encode_pairs, extend_url_query_string};
use indexmap::IndexMap;
use rest_orm_conf::ClientSettings;
use serde_json::Value;
use std::fmt;
use std::time::Duration;

/// Ordered request arguments
pub type Params = IndexMap<String, Value>;

/// HTTP methods used by the ORM
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
	Get,
	Post,
	Put,
	Patch,
	Delete,
}

impl Method {
	pub fn as_str(&self) -> &'static str {
		match self {
			Method::Get => "GET",
			Method::Post => "POST",
			Method::Put => "PUT",
			Method::Patch => "PATCH",
			Method::Delete => "DELETE",
		}
	}
}

impl fmt::Display for Method {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// One REST call: query params for reads, a payload for writes.
#[derive(Debug, Clone, PartialEq)]
pub struct RestRequest {
	pub method: Method,
	pub url: String,
	pub params: Params,
	pub data: Option<Params>,
}

impl RestRequest {
	pub fn new(method: Method, url: impl Into<String>) -> Self {
		Self {
			method,
			url: url.into(),
			params: Params::new(),
			data: None,
		}
	}

	pub fn get(url: impl Into<String>) -> Self {
		Self::new(Method::Get, url)
	}

	pub fn post(url: impl Into<String>) -> Self {
		Self::new(Method::Post, url)
	}

	pub fn patch(url: impl Into<String>) -> Self {
		Self::new(Method::Patch, url)
	}

	pub fn delete(url: impl Into<String>) -> Self {
		Self::new(Method::Delete, url)
	}

	pub fn with_params(mut self, params: Params) -> Self {
		self.params = params;
		self
	}

	pub fn with_data(mut self, data: Params) -> Self {
		self.data = Some(data);
		self
	}

	/// The request URL with its params merged into the query string.
	pub fn full_url(&self) -> Result<String> {
		extend_url_query_string(&self.url, &self.params)
	}

	/// The arguments of this request rendered as JSON, for error reports.
	pub fn render_arguments(&self) -> String {
		let arguments = self.data.as_ref().unwrap_or(&self.params);
		serde_json::to_string(arguments).unwrap_or_default()
	}
}

/// The raw outcome of a transport call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestResponse {
	pub status: u16,
	pub reason: String,
	pub body: String,
}

impl RestResponse {
	/// Create a response, deriving the reason phrase from the status.
	pub fn new(status: u16, body: impl Into<String>) -> Self {
		let reason = reqwest::StatusCode::from_u16(status)
			.ok()
			.and_then(|code| code.canonical_reason())
			.unwrap_or("")
			.to_string();
		Self {
			status,
			reason,
			body: body.into(),
		}
	}

	/// A 200 response carrying `value` as JSON.
	pub fn json(value: &Value) -> Self {
		Self::new(200, value.to_string())
	}

	/// A 204 response without body.
	pub fn no_content() -> Self {
		Self::new(204, "")
	}

	pub fn is_success(&self) -> bool {
		(200..300).contains(&self.status)
	}

	/// Decode the body; an empty body decodes to `None`.
	pub fn json_body(&self) -> Result<Option<Value>> {
		if self.body.trim().is_empty() {
			return Ok(None);
		}
		Ok(Some(serde_json::from_str(&self.body)?))
	}
}

/// Executes REST calls.
///
/// Implementations return every response, successful or not; status
/// mapping happens in [`rest_call`].
pub trait Transport: Send + Sync {
	fn execute(&self, request: &RestRequest) -> Result<RestResponse>;
}

/// Blocking HTTP transport backed by `reqwest`.
///
/// Query params are URL-encoded with lists repeating their key; payloads are
/// form-encoded.
#[derive(Debug, Clone)]
pub struct HttpTransport {
	client: reqwest::blocking::Client,
}

impl HttpTransport {
	pub fn new() -> Result<Self> {
		Self::from_settings(&ClientSettings::default())
	}

	/// Build a transport honoring the configured timeout
	pub fn from_settings(settings: &ClientSettings) -> Result<Self> {
		let mut builder = reqwest::blocking::Client::builder();
		if let Some(secs) = settings.request_timeout_secs {
			builder = builder.timeout(Duration::from_secs(secs));
		}
		let client = builder
			.build()
			.map_err(|e| Error::Transport(e.to_string()))?;
		Ok(Self { client })
	}
}

impl Transport for HttpTransport {
	fn execute(&self, request: &RestRequest) -> Result<RestResponse> {
		let url = request.full_url()?;
		let method = match request.method {
			Method::Get => reqwest::Method::GET,
			Method::Post => reqwest::Method::POST,
			Method::Put => reqwest::Method::PUT,
			Method::Patch => reqwest::Method::PATCH,
			Method::Delete => reqwest::Method::DELETE,
		};

		let mut builder = self.client.request(method, &url);
		if let Some(data) = &request.data {
			builder = builder.form(&encode_pairs(data));
		}

		let response = builder
			.send()
			.map_err(|e| Error::Transport(e.to_string()))?;
		let status = response.status().as_u16();
		let body = response
			.text()
			.map_err(|e| Error::Transport(e.to_string()))?;

		Ok(RestResponse::new(status, body))
	}
}

/// Run `request` through the ORM call pipeline.
///
/// - top-level null params are rejected before any call
/// - with a `scope`, GETs are served from and stored into the cache, and any
///   other method clears it
/// - non-2xx statuses are mapped with [`Error::from_response`] on behalf
///   of `model`
pub fn rest_call(
	transport: &dyn Transport,
	scope: Option<&RequestScope>,
	model: &str,
	request: &RestRequest,
) -> Result<Option<Value>> {
	if let Some((key, _)) = request.params.iter().find(|(_, value)| value.is_null()) {
		return Err(Error::InvalidArgument(format!(
			"Found null value for \"{}\" in params for REST call {} {}",
			key, request.method, request.url
		)));
	}

	let cache_key = match scope {
		Some(scope) if request.method == Method::Get => {
			let key = request.full_url()?;
			if let Some(cached) = scope.get(&key) {
				tracing::debug!(model, "(cached) {} {}", request.method, key);
				return Ok(cached);
			}
			Some(key)
		}
		Some(scope) => {
			scope.clear();
			None
		}
		None => None,
	};

	tracing::debug!(
		model,
		params = %request.render_arguments(),
		"{} {}",
		request.method,
		request.url
	);
	let response = transport.execute(request)?;

	if !response.is_success() {
		let error = ErrorResponse {
			status: response.status,
			reason: response.reason,
			method: request.method,
			url: request.url.clone(),
			arguments: request.render_arguments(),
			body: response.body,
		};
		return Err(Error::from_response(model, error));
	}

	let body = response.json_body()?;
	if let (Some(scope), Some(key)) = (scope, cache_key) {
		scope.insert(key, body.clone());
	}
	Ok(body)
}

#[cfg(test)]
mod tests {
	use super::*;
	use parking_lot::Mutex;
	use rstest::{fixture, rstest};
	use serde_json::json;

	struct StubTransport {
		response: RestResponse,
		calls: Mutex<Vec<RestRequest>>,
	}

	impl Transport for StubTransport {
		fn execute(&self, request: &RestRequest) -> Result<RestResponse> {
			self.calls.lock().push(request.clone());
			Ok(self.response.clone())
		}
	}

	#[fixture]
	fn transport() -> StubTransport {
		StubTransport {
			response: RestResponse::json(&json!({"id": 1})),
			calls: Mutex::new(Vec::new()),
		}
	}

	#[rstest]
	fn test_scope_serves_repeated_gets(transport: StubTransport) {
		let scope = RequestScope::new();
		let request = RestRequest::get("http://example.org/customers/1/");

		let first = rest_call(&transport, Some(&scope), "Customer", &request).unwrap();
		let second = rest_call(&transport, Some(&scope), "Customer", &request).unwrap();

		assert_eq!(first, second);
		assert_eq!(transport.calls.lock().len(), 1);
	}

	#[rstest]
	fn test_non_get_clears_scope(transport: StubTransport) {
		let scope = RequestScope::new();
		let get = RestRequest::get("http://example.org/customers/1/");
		let patch = RestRequest::patch("http://example.org/customers/1/");

		rest_call(&transport, Some(&scope), "Customer", &get).unwrap();
		rest_call(&transport, Some(&scope), "Customer", &patch).unwrap();
		rest_call(&transport, Some(&scope), "Customer", &get).unwrap();

		assert_eq!(transport.calls.lock().len(), 3);
	}

	#[rstest]
	fn test_params_take_part_in_cache_key(transport: StubTransport) {
		let scope = RequestScope::new();
		let mut params = Params::new();
		params.insert("a".to_string(), json!(1));
		let plain = RestRequest::get("http://example.org/customers/");
		let filtered = plain.clone().with_params(params);

		rest_call(&transport, Some(&scope), "Customer", &plain).unwrap();
		rest_call(&transport, Some(&scope), "Customer", &filtered).unwrap();

		assert_eq!(transport.calls.lock().len(), 2);
		assert!(scope.get("http://example.org/customers/?a=1").is_some());
	}

	#[rstest]
	fn test_null_param_rejected(transport: StubTransport) {
		let mut params = Params::new();
		params.insert("customer".to_string(), Value::Null);
		let request = RestRequest::get("http://example.org/devices/").with_params(params);

		let result = rest_call(&transport, None, "Device", &request);

		assert!(matches!(result, Err(Error::InvalidArgument(_))));
		assert!(transport.calls.lock().is_empty());
	}

	#[rstest]
	fn test_status_is_mapped_for_model() {
		let transport = StubTransport {
			response: RestResponse::new(404, "{\"detail\":\"Not found.\"}"),
			calls: Mutex::new(Vec::new()),
		};
		let request = RestRequest::get("http://example.org/customers/9/");

		let error = rest_call(&transport, None, "Customer", &request).unwrap_err();

		assert!(error.does_not_exist_for("Customer"));
		assert_eq!(error.response().map(|r| r.reason.as_str()), Some("Not Found"));
	}

	#[rstest]
	fn test_empty_body_is_none() {
		let transport = StubTransport {
			response: RestResponse::no_content(),
			calls: Mutex::new(Vec::new()),
		};
		let request = RestRequest::delete("http://example.org/customers/1/");

		assert_eq!(rest_call(&transport, None, "Customer", &request).unwrap(), None);
	}
}
