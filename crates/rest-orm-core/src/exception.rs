//! Error taxonomy for rest-orm.
//!
//! Every fallible ORM operation returns [`Result<T>`]. Non-2xx responses are
//! mapped onto dedicated variants by [`Error::from_response`]:
//!
//! | status | variant |
//! |---|---|
//! | 400 | [`Error::BadRequest`] |
//! | 404 | [`Error::DoesNotExist`] (for the model issuing the call) |
//! | 409 | [`Error::Conflict`] |
//! | 502 | [`Error::BadGateway`] |
//! | other | [`Error::Server`] |

use crate::http::Method;
use std::fmt;

/// Result type used throughout rest-orm
pub type Result<T> = std::result::Result<T, Error>;

/// The offending response of a failed REST call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorResponse {
	pub status: u16,
	pub reason: String,
	pub method: Method,
	pub url: String,
	/// Query params or payload of the request, rendered as JSON.
	pub arguments: String,
	pub body: String,
}

impl fmt::Display for ErrorResponse {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(
			f,
			"{} {}\n{} {} {}\n{}",
			self.status, self.reason, self.method, self.url, self.arguments, self.body
		)
	}
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
	/// No object matched, either reported by the server (404) or by an
	/// empty lookup result.
	#[error("{message}")]
	DoesNotExist {
		model: String,
		message: String,
		response: Option<Box<ErrorResponse>>,
	},

	#[error("get() returned more than one {model} -- it returned {count}!")]
	MultipleObjectsReturned { model: String, count: u64 },

	#[error("{0}")]
	NotPersisted(String),

	#[error("Invalid argument: {0}")]
	InvalidArgument(String),

	#[error("{0}")]
	FieldTypeMismatch(String),

	#[error("{0}")]
	BadRequest(Box<ErrorResponse>),

	#[error("{0}")]
	Conflict(Box<ErrorResponse>),

	#[error("{0}")]
	BadGateway(Box<ErrorResponse>),

	#[error("{0}")]
	Server(Box<ErrorResponse>),

	#[error("Model \"{0}\" is not registered")]
	ModelNotRegistered(String),

	#[error("Improperly configured: {0}")]
	ImproperlyConfigured(String),

	#[error("Transport error: {0}")]
	Transport(String),

	#[error("Unexpected response: {0}")]
	UnexpectedResponse(String),

	#[error("Serialization error: {0}")]
	Serialization(#[from] serde_json::Error),

	#[error("Invalid URL: {0}")]
	Url(#[from] url::ParseError),
}

impl Error {
	/// Build the lookup-miss error of `model`.
	pub fn does_not_exist(model: impl Into<String>) -> Self {
		let model = model.into();
		Self::DoesNotExist {
			message: format!("{} matching query does not exist.", model),
			model,
			response: None,
		}
	}

	/// Map a non-2xx response onto its error variant.
	///
	/// `model` names the model that issued the call and qualifies 404s.
	pub fn from_response(model: &str, response: ErrorResponse) -> Self {
		let response = Box::new(response);
		match response.status {
			400 => Self::BadRequest(response),
			404 => Self::DoesNotExist {
				model: model.to_string(),
				message: response.to_string(),
				response: Some(response),
			},
			409 => Self::Conflict(response),
			502 => Self::BadGateway(response),
			_ => Self::Server(response),
		}
	}

	/// Check whether this is a `DoesNotExist` raised for `model`.
	///
	/// Lookup misses of different models stay distinguishable:
	///
	/// ```
	/// use rest_orm_core::Error;
	///
	/// let error = Error::does_not_exist("Customer");
	/// assert!(error.does_not_exist_for("Customer"));
	/// assert!(!error.does_not_exist_for("Device"));
	/// ```
	pub fn does_not_exist_for(&self, model: &str) -> bool {
		matches!(self, Self::DoesNotExist { model: m, .. } if m == model)
	}

	/// Check whether this is a `DoesNotExist` of any model.
	pub fn is_does_not_exist(&self) -> bool {
		matches!(self, Self::DoesNotExist { .. })
	}

	/// The offending response, when the error was caused by one.
	pub fn response(&self) -> Option<&ErrorResponse> {
		match self {
			Self::DoesNotExist { response, .. } => response.as_deref(),
			Self::BadRequest(r) | Self::Conflict(r) | Self::BadGateway(r) | Self::Server(r) => {
				Some(r)
			}
			_ => None,
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use rstest::rstest;

	fn response(status: u16) -> ErrorResponse {
		ErrorResponse {
			status,
			reason: "Reason".to_string(),
			method: Method::Get,
			url: "http://example.org/customers/".to_string(),
			arguments: "{}".to_string(),
			body: "{\"detail\":\"x\"}".to_string(),
		}
	}

	#[rstest]
	#[case(400, "BadRequest")]
	#[case(404, "DoesNotExist")]
	#[case(409, "Conflict")]
	#[case(502, "BadGateway")]
	#[case(500, "Server")]
	#[case(503, "Server")]
	#[case(401, "Server")]
	fn test_status_mapping(#[case] status: u16, #[case] expected: &str) {
		let error = Error::from_response("Customer", response(status));
		let name = match &error {
			Error::BadRequest(_) => "BadRequest",
			Error::DoesNotExist { .. } => "DoesNotExist",
			Error::Conflict(_) => "Conflict",
			Error::BadGateway(_) => "BadGateway",
			Error::Server(_) => "Server",
			_ => "other",
		};
		assert_eq!(name, expected);
		assert_eq!(error.response().map(|r| r.status), Some(status));
	}

	#[rstest]
	fn test_not_found_is_scoped_to_model() {
		let error = Error::from_response("Customer", response(404));

		assert!(error.does_not_exist_for("Customer"));
		assert!(!error.does_not_exist_for("Device"));
	}

	#[rstest]
	fn test_response_display() {
		let rendered = response(409).to_string();

		assert_eq!(
			rendered,
			"409 Reason\nGET http://example.org/customers/ {}\n{\"detail\":\"x\"}"
		);
	}

	#[rstest]
	fn test_lookup_messages() {
		assert_eq!(
			Error::does_not_exist("Customer").to_string(),
			"Customer matching query does not exist."
		);
		assert_eq!(
			Error::MultipleObjectsReturned {
				model: "Customer".to_string(),
				count: 3
			}
			.to_string(),
			"get() returned more than one Customer -- it returned 3!"
		);
	}
}
