//! Request-scope GET cache.
//!
//! A [`RequestScope`] memoizes GET responses keyed by the full URL (query
//! string included). Any non-GET call made through the scope clears it
//! entirely. The scope is an explicit value: create it at the start of a
//! unit of work, pass it to querysets, and drop it at the end.

use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// Clonable handle to a shared GET cache.
#[derive(Clone, Default)]
pub struct RequestScope {
	entries: Arc<Mutex<HashMap<String, Option<Value>>>>,
}

impl RequestScope {
	/// Create an empty scope
	pub fn new() -> Self {
		Self::default()
	}

	/// Look up a cached response. The outer `Option` reports the hit.
	pub fn get(&self, key: &str) -> Option<Option<Value>> {
		self.entries.lock().get(key).cloned()
	}

	/// Store a response
	pub fn insert(&self, key: impl Into<String>, value: Option<Value>) {
		self.entries.lock().insert(key.into(), value);
	}

	/// Drop every cached response
	pub fn clear(&self) {
		let mut entries = self.entries.lock();
		if !entries.is_empty() {
			tracing::debug!(entries = entries.len(), "clearing request scope");
		}
		entries.clear();
	}

	pub fn len(&self) -> usize {
		self.entries.lock().len()
	}

	pub fn is_empty(&self) -> bool {
		self.entries.lock().is_empty()
	}

	/// Check whether two handles share the same cache
	pub fn same_scope(&self, other: &RequestScope) -> bool {
		Arc::ptr_eq(&self.entries, &other.entries)
	}
}

impl std::fmt::Debug for RequestScope {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("RequestScope")
			.field("entries", &self.len())
			.finish()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use rstest::rstest;
	use serde_json::json;

	#[rstest]
	fn test_clones_share_entries() {
		let scope = RequestScope::new();
		let other = scope.clone();

		scope.insert("http://example.org/customers/", Some(json!({"count": 0})));

		assert_eq!(
			other.get("http://example.org/customers/"),
			Some(Some(json!({"count": 0})))
		);
		assert!(scope.same_scope(&other));
		assert!(!scope.same_scope(&RequestScope::new()));
	}

	#[rstest]
	fn test_clear() {
		let scope = RequestScope::new();
		scope.insert("a", None);
		scope.insert("b", Some(json!(1)));

		scope.clear();

		assert!(scope.is_empty());
		assert_eq!(scope.get("a"), None);
	}
}
