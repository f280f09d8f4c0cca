//! # rest-orm core
//!
//! Building blocks shared by the rest-orm crates:
//!
//! - [`exception`]: the error taxonomy, including the HTTP status mapping
//! - [`http`]: requests, responses, the [`Transport`] seam and the reqwest-backed transport
//! - [`cache`]: the per-request GET cache ([`RequestScope`])
//! - [`querystring`]: query-string merging used for URLs and cache keys

pub mod cache;
pub mod exception;
pub mod http;
pub mod querystring;

pub use cache::RequestScope;
pub use exception::{Error, ErrorResponse, Result};
pub use http::{HttpTransport, Method, Params, RestRequest, RestResponse, Transport, rest_call};
pub use querystring::extend_url_query_string;
