//! Query-string utilities.

use crate::exception::Result;
use crate::http::Params;
use indexmap::IndexMap;
use serde_json::Value;
use url::Url;

/// Render a scalar JSON value as a query-string or form value.
///
/// Returns `None` for nulls, which are never transmitted.
pub fn value_to_param(value: &Value) -> Option<String> {
	match value {
		Value::Null => None,
		Value::String(s) => Some(s.clone()),
		Value::Bool(b) => Some(b.to_string()),
		Value::Number(n) => Some(n.to_string()),
		other => Some(other.to_string()),
	}
}

/// Expand params into ordered `(key, value)` pairs.
///
/// Lists repeat their key once per element. Nulls, including nulls inside
/// lists, are dropped.
pub fn encode_pairs(params: &Params) -> Vec<(String, String)> {
	let mut pairs = Vec::new();
	for (key, value) in params {
		match value {
			Value::Array(items) => {
				pairs.extend(
					items
						.iter()
						.filter_map(value_to_param)
						.map(|v| (key.clone(), v)),
				);
			}
			other => {
				if let Some(v) = value_to_param(other) {
					pairs.push((key.clone(), v));
				}
			}
		}
	}
	pairs
}

/// Merge `params` into the query string already present on `url`.
///
/// Keys in `params` replace existing keys of the same name. Null values
/// are ignored.
///
/// # Examples
///
/// ```
/// use rest_orm_core::extend_url_query_string;
/// use rest_orm_core::Params;
/// use serde_json::json;
///
/// let mut params = Params::new();
/// params.insert("b".to_string(), json!(2));
///
/// let url = extend_url_query_string("http://localhost:8010/?a=1", &params).unwrap();
/// assert_eq!(url, "http://localhost:8010/?a=1&b=2");
/// ```
pub fn extend_url_query_string(url: &str, params: &Params) -> Result<String> {
	let mut parsed = Url::parse(url)?;

	let mut query: IndexMap<String, Vec<String>> = IndexMap::new();
	for (key, value) in parsed.query_pairs() {
		if value.is_empty() {
			continue;
		}
		query
			.entry(key.into_owned())
			.or_default()
			.push(value.into_owned());
	}

	for (key, value) in params {
		let values = match value {
			Value::Null => continue,
			Value::Array(items) => items.iter().filter_map(value_to_param).collect(),
			other => value_to_param(other).into_iter().collect(),
		};
		query.insert(key.clone(), values);
	}

	parsed.set_query(None);
	if query.values().any(|values| !values.is_empty()) {
		let mut serializer = parsed.query_pairs_mut();
		for (key, values) in &query {
			for value in values {
				serializer.append_pair(key, value);
			}
		}
	}

	Ok(parsed.to_string())
}

#[cfg(test)]
mod tests {
	use super::*;
	use rstest::rstest;
	use serde_json::json;

	fn params(value: Value) -> Params {
		value
			.as_object()
			.map(|map| map.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
			.unwrap_or_default()
	}

	#[rstest]
	#[case("http://localhost:8010/?a=1", json!({"b": 2}), "http://localhost:8010/?a=1&b=2")]
	#[case("http://localhost:8010/?a=1", json!({"a": 3}), "http://localhost:8010/?a=3")]
	#[case("http://localhost:8010/", json!({}), "http://localhost:8010/")]
	#[case("http://localhost:8010/", json!({"a": null}), "http://localhost:8010/")]
	#[case(
		"http://localhost:8010/",
		json!({"id__in": [1, null, 2]}),
		"http://localhost:8010/?id__in=1&id__in=2"
	)]
	#[case(
		"http://localhost:8010/?a=1",
		json!({"a": null}),
		"http://localhost:8010/?a=1"
	)]
	fn test_extend_url_query_string(
		#[case] url: &str,
		#[case] extra: Value,
		#[case] expected: &str,
	) {
		assert_eq!(extend_url_query_string(url, &params(extra)).unwrap(), expected);
	}

	#[rstest]
	fn test_encode_pairs() {
		let pairs = encode_pairs(&params(json!({
			"name": "x",
			"flag": true,
			"ids": [1, 2],
			"skip": null,
		})));

		assert_eq!(
			pairs,
			vec![
				("name".to_string(), "x".to_string()),
				("flag".to_string(), "true".to_string()),
				("ids".to_string(), "1".to_string()),
				("ids".to_string(), "2".to_string()),
			]
		);
	}
}
