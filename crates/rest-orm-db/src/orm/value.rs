//! Attribute values and lookup maps.

use super::entity::Entity;
use chrono::{DateTime, NaiveDate, NaiveTime, SecondsFormat, TimeZone, Utc};
use indexmap::IndexMap;
use serde_json::Value;
use std::fmt;

/// The value of an entity attribute or of a query lookup.
#[derive(Clone)]
pub enum FieldValue {
	/// A JSON value as stored in a record.
	Json(Value),
	/// A related entity, transmitted as its primary key.
	Entity(Entity),
	/// The current timestamp, evaluated when the value is transmitted.
	Now,
}

impl FieldValue {
	/// The current-timestamp sentinel.
	pub fn now() -> Self {
		FieldValue::Now
	}

	pub fn null() -> Self {
		FieldValue::Json(Value::Null)
	}

	pub fn is_null(&self) -> bool {
		matches!(self, FieldValue::Json(Value::Null))
	}

	pub fn as_json(&self) -> Option<&Value> {
		match self {
			FieldValue::Json(value) => Some(value),
			_ => None,
		}
	}

	pub fn as_entity(&self) -> Option<&Entity> {
		match self {
			FieldValue::Entity(entity) => Some(entity),
			_ => None,
		}
	}

	pub fn as_str(&self) -> Option<&str> {
		self.as_json().and_then(Value::as_str)
	}

	pub fn as_i64(&self) -> Option<i64> {
		self.as_json().and_then(Value::as_i64)
	}

	/// Whether this is an empty JSON list.
	pub(crate) fn is_empty_list(&self) -> bool {
		matches!(self, FieldValue::Json(Value::Array(items)) if items.is_empty())
	}

	/// Normalize for use as a query parameter.
	///
	/// Entities become their primary key and the timestamp sentinel is
	/// evaluated.
	pub fn to_param(&self) -> Value {
		match self {
			FieldValue::Json(value) => value.clone(),
			FieldValue::Entity(entity) => entity.pk().unwrap_or(Value::Null),
			FieldValue::Now => Value::String(timestamp()),
		}
	}

	/// Normalize for use in a write payload.
	///
	/// Like [`to_param`](Self::to_param), and mappings are serialized to a
	/// JSON string.
	pub fn to_payload(&self) -> Value {
		match self {
			FieldValue::Json(Value::Object(map)) => {
				Value::String(Value::Object(map.clone()).to_string())
			}
			other => other.to_param(),
		}
	}
}

fn timestamp() -> String {
	Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

impl PartialEq for FieldValue {
	fn eq(&self, other: &Self) -> bool {
		match (self, other) {
			(FieldValue::Json(a), FieldValue::Json(b)) => a == b,
			(FieldValue::Entity(a), FieldValue::Entity(b)) => a == b,
			(FieldValue::Now, FieldValue::Now) => true,
			_ => false,
		}
	}
}

impl fmt::Debug for FieldValue {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			FieldValue::Json(value) => write!(f, "{}", value),
			FieldValue::Entity(entity) => write!(
				f,
				"{}(pk={})",
				entity.model().name(),
				entity.pk().unwrap_or(Value::Null)
			),
			FieldValue::Now => f.write_str("now()"),
		}
	}
}

impl From<Value> for FieldValue {
	fn from(value: Value) -> Self {
		FieldValue::Json(value)
	}
}

impl From<Entity> for FieldValue {
	fn from(entity: Entity) -> Self {
		FieldValue::Entity(entity)
	}
}

impl From<&Entity> for FieldValue {
	fn from(entity: &Entity) -> Self {
		FieldValue::Entity(entity.clone())
	}
}

impl From<&str> for FieldValue {
	fn from(value: &str) -> Self {
		FieldValue::Json(Value::String(value.to_string()))
	}
}

impl From<String> for FieldValue {
	fn from(value: String) -> Self {
		FieldValue::Json(Value::String(value))
	}
}

impl From<bool> for FieldValue {
	fn from(value: bool) -> Self {
		FieldValue::Json(Value::Bool(value))
	}
}

impl From<f64> for FieldValue {
	fn from(value: f64) -> Self {
		FieldValue::Json(Value::from(value))
	}
}

macro_rules! impl_from_integer {
	($($ty:ty),*) => {
		$(
			impl From<$ty> for FieldValue {
				fn from(value: $ty) -> Self {
					FieldValue::Json(Value::from(value))
				}
			}
		)*
	};
}

impl_from_integer!(i32, i64, u32, u64, usize);

impl<T: Into<Value>> From<Vec<T>> for FieldValue {
	fn from(values: Vec<T>) -> Self {
		FieldValue::Json(Value::from(values))
	}
}

impl<T: Into<FieldValue>> From<Option<T>> for FieldValue {
	fn from(value: Option<T>) -> Self {
		value.map(Into::into).unwrap_or_else(FieldValue::null)
	}
}

impl<Tz: TimeZone> From<DateTime<Tz>> for FieldValue {
	fn from(value: DateTime<Tz>) -> Self {
		FieldValue::Json(Value::String(
			value.with_timezone(&Utc).to_rfc3339_opts(SecondsFormat::AutoSi, true),
		))
	}
}

impl From<NaiveDate> for FieldValue {
	fn from(value: NaiveDate) -> Self {
		FieldValue::Json(Value::String(value.format("%Y-%m-%d").to_string()))
	}
}

impl From<NaiveTime> for FieldValue {
	fn from(value: NaiveTime) -> Self {
		FieldValue::Json(Value::String(value.format("%H:%M:%S%.f").to_string()))
	}
}

/// Ordered keyword arguments for lookups, entity construction and methods.
///
/// Built from a single pair, an array or vector of pairs, or with the
/// [`lookups!`](crate::lookups) macro when values have different types.
#[derive(Clone, Default, Debug, PartialEq)]
pub struct Lookups(IndexMap<String, FieldValue>);

impl Lookups {
	pub fn new() -> Self {
		Self::default()
	}

	/// Insert a lookup, replacing a previous value for the same key.
	pub fn insert(&mut self, key: impl Into<String>, value: impl Into<FieldValue>) {
		self.0.insert(key.into(), value.into());
	}

	/// Builder-style [`insert`](Self::insert).
	pub fn with(mut self, key: impl Into<String>, value: impl Into<FieldValue>) -> Self {
		self.insert(key, value);
		self
	}

	pub fn get(&self, key: &str) -> Option<&FieldValue> {
		self.0.get(key)
	}

	pub fn contains_key(&self, key: &str) -> bool {
		self.0.contains_key(key)
	}

	pub fn remove(&mut self, key: &str) -> Option<FieldValue> {
		self.0.shift_remove(key)
	}

	pub fn len(&self) -> usize {
		self.0.len()
	}

	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}

	pub fn iter(&self) -> indexmap::map::Iter<'_, String, FieldValue> {
		self.0.iter()
	}

	pub fn keys(&self) -> impl Iterator<Item = &str> {
		self.0.keys().map(String::as_str)
	}

	/// Merge `other` into these lookups, `other` winning on conflicts.
	pub fn extend(&mut self, other: Lookups) {
		self.0.extend(other.0);
	}

	pub fn into_inner(self) -> IndexMap<String, FieldValue> {
		self.0
	}
}

impl<K: Into<String>, V: Into<FieldValue>> From<(K, V)> for Lookups {
	fn from((key, value): (K, V)) -> Self {
		Lookups::new().with(key, value)
	}
}

impl<K: Into<String>, V: Into<FieldValue>, const N: usize> From<[(K, V); N]> for Lookups {
	fn from(pairs: [(K, V); N]) -> Self {
		pairs.into_iter().collect()
	}
}

impl<K: Into<String>, V: Into<FieldValue>> From<Vec<(K, V)>> for Lookups {
	fn from(pairs: Vec<(K, V)>) -> Self {
		pairs.into_iter().collect()
	}
}

impl From<IndexMap<String, FieldValue>> for Lookups {
	fn from(map: IndexMap<String, FieldValue>) -> Self {
		Lookups(map)
	}
}

impl<K: Into<String>, V: Into<FieldValue>> FromIterator<(K, V)> for Lookups {
	fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
		let mut lookups = Lookups::new();
		for (key, value) in iter {
			lookups.insert(key, value);
		}
		lookups
	}
}

impl IntoIterator for Lookups {
	type Item = (String, FieldValue);
	type IntoIter = indexmap::map::IntoIter<String, FieldValue>;

	fn into_iter(self) -> Self::IntoIter {
		self.0.into_iter()
	}
}

impl<'a> IntoIterator for &'a Lookups {
	type Item = (&'a String, &'a FieldValue);
	type IntoIter = indexmap::map::Iter<'a, String, FieldValue>;

	fn into_iter(self) -> Self::IntoIter {
		self.0.iter()
	}
}

/// Build [`Lookups`] from `key => value` pairs of mixed value types.
///
/// # Examples
///
/// ```rust,ignore
/// use rest_orm_db::lookups;
///
/// let queryset = customers.filter(lookups! { "name" => "ACME", "active" => true });
/// ```
#[macro_export]
macro_rules! lookups {
	() => {
		$crate::orm::Lookups::new()
	};
	($($key:expr => $value:expr),+ $(,)?) => {{
		let mut lookups = $crate::orm::Lookups::new();
		$( lookups.insert($key, $value); )+
		lookups
	}};
}
