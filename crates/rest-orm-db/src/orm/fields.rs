//! Field declarations.
//!
//! A [`Field`] governs one attribute of a model: how its stored value is
//! read (parsed lazily, dereferenced, wrapped) and how writes are recorded.
//! The read and write behaviour itself lives on [`Entity`](super::Entity).

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime};
use indexmap::IndexMap;
use serde_json::Value;
use std::fmt;
use url::Url;

/// The behaviour of a declared field.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldKind {
	/// Stores and returns the raw value.
	Plain,
	/// An ISO 8601 timestamp parsed on read.
	DateTime,
	/// An ISO 8601 date parsed on read.
	Date,
	/// A time of day parsed on read.
	Time,
	/// A file path or URL, read as [`FieldFile`].
	File,
	/// A `"<app_label>_<model>"` content type, read as [`ContentTypeRef`].
	ContentType,
	/// A foreign key to `target`.
	Reference {
		target: String,
		related_name: Option<String>,
		one_to_one: bool,
	},
	/// The reverse side of a [`FieldKind::Reference`] declared on `target`.
	ReverseReference {
		target: String,
		/// The key of the foreign key on `target`.
		field_name: String,
		filters: IndexMap<String, Value>,
		one_to_one: bool,
	},
	/// A relation addressed by a content type and an object id.
	GenericRelation {
		content_type_field: String,
		object_id_field: String,
	},
}

/// A declared model field.
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
	name: String,
	source: Option<String>,
	kind: FieldKind,
}

impl Field {
	fn new(name: impl Into<String>, kind: FieldKind) -> Self {
		Self {
			name: name.into(),
			source: None,
			kind,
		}
	}

	pub fn plain(name: impl Into<String>) -> Self {
		Self::new(name, FieldKind::Plain)
	}

	pub fn datetime(name: impl Into<String>) -> Self {
		Self::new(name, FieldKind::DateTime)
	}

	pub fn date(name: impl Into<String>) -> Self {
		Self::new(name, FieldKind::Date)
	}

	pub fn time(name: impl Into<String>) -> Self {
		Self::new(name, FieldKind::Time)
	}

	pub fn file(name: impl Into<String>) -> Self {
		Self::new(name, FieldKind::File)
	}

	pub fn content_type(name: impl Into<String>) -> Self {
		Self::new(name, FieldKind::ContentType)
	}

	/// A foreign key to the model registered as `target`.
	///
	/// Unless [`related_name`](Self::related_name) ends with `+`, registering
	/// the owning model schedules a reverse accessor on `target`, named after
	/// `related_name` or `<model_name>_set`.
	///
	/// # Examples
	///
	/// ```rust,ignore
	/// let field = Field::reference("customer", "Customer").related_name("devices");
	/// ```
	pub fn reference(name: impl Into<String>, target: impl Into<String>) -> Self {
		Self::new(
			name,
			FieldKind::Reference {
				target: target.into(),
				related_name: None,
				one_to_one: false,
			},
		)
	}

	/// The reverse side of the foreign key `field_name` declared on `target`.
	pub fn reverse_reference(
		name: impl Into<String>,
		target: impl Into<String>,
		field_name: impl Into<String>,
	) -> Self {
		Self::new(
			name,
			FieldKind::ReverseReference {
				target: target.into(),
				field_name: field_name.into(),
				filters: IndexMap::new(),
				one_to_one: false,
			},
		)
	}

	pub fn generic_relation(
		name: impl Into<String>,
		content_type_field: impl Into<String>,
		object_id_field: impl Into<String>,
	) -> Self {
		Self::new(
			name,
			FieldKind::GenericRelation {
				content_type_field: content_type_field.into(),
				object_id_field: object_id_field.into(),
			},
		)
	}

	/// Read the value from record key `key` instead of the attribute name.
	pub fn source(mut self, key: impl Into<String>) -> Self {
		self.source = Some(key.into());
		self
	}

	/// Set the reverse accessor name of a reference.
	pub fn related_name(mut self, related: impl Into<String>) -> Self {
		if let FieldKind::Reference { related_name, .. } = &mut self.kind {
			*related_name = Some(related.into());
		}
		self
	}

	/// Mark a reference or reverse reference as one-to-one.
	pub fn one_to_one(mut self) -> Self {
		match &mut self.kind {
			FieldKind::Reference { one_to_one, .. }
			| FieldKind::ReverseReference { one_to_one, .. } => *one_to_one = true,
			_ => {}
		}
		self
	}

	/// Add a fixed filter to a reverse reference.
	pub fn filter(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
		if let FieldKind::ReverseReference { filters, .. } = &mut self.kind {
			filters.insert(key.into(), value.into());
		}
		self
	}

	/// The attribute name.
	pub fn name(&self) -> &str {
		&self.name
	}

	/// The record key holding the value.
	pub fn field_name(&self) -> &str {
		self.source.as_deref().unwrap_or(&self.name)
	}

	pub fn kind(&self) -> &FieldKind {
		&self.kind
	}

	/// The name of the field type, as used in diagnostics.
	pub fn type_name(&self) -> &'static str {
		match self.kind {
			FieldKind::Plain => "Field",
			FieldKind::DateTime => "DateTimeField",
			FieldKind::Date => "DateField",
			FieldKind::Time => "TimeField",
			FieldKind::File => "FileField",
			FieldKind::ContentType => "ContentTypeField",
			FieldKind::Reference { .. } => "Reference",
			FieldKind::ReverseReference { .. } => "ReverseReference",
			FieldKind::GenericRelation { .. } => "GenericRelationField",
		}
	}

	pub fn is_reference(&self) -> bool {
		matches!(self.kind, FieldKind::Reference { .. })
	}

	/// The reverse accessor a reference contributes to its target, as
	/// `(target model, field)`.
	pub(crate) fn reverse_binding(&self, model_name: &str) -> Option<(String, Field)> {
		let FieldKind::Reference {
			target,
			related_name,
			one_to_one,
		} = &self.kind
		else {
			return None;
		};
		if related_name.as_deref().is_some_and(|name| name.ends_with('+')) {
			return None;
		}
		let accessor = related_name
			.clone()
			.unwrap_or_else(|| format!("{}_set", model_name.to_lowercase()));
		let mut reverse = Field::reverse_reference(accessor, model_name, self.field_name());
		if *one_to_one {
			reverse = reverse.one_to_one();
		}
		Some((target.clone(), reverse))
	}
}

/// A stored file reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldFile {
	name: String,
}

impl FieldFile {
	pub fn new(name: impl Into<String>) -> Self {
		Self { name: name.into() }
	}

	/// The stored path or URL.
	pub fn name(&self) -> &str {
		&self.name
	}

	/// A URL for the file: absolute URLs and paths are returned unchanged,
	/// bare names get a leading `/`.
	///
	/// ```
	/// use rest_orm_db::orm::FieldFile;
	///
	/// assert_eq!(FieldFile::new("media/a.png").url(), "/media/a.png");
	/// assert_eq!(FieldFile::new("/media/a.png").url(), "/media/a.png");
	/// assert_eq!(FieldFile::new("http://cdn.example.org/a.png").url(), "http://cdn.example.org/a.png");
	/// ```
	pub fn url(&self) -> String {
		if Url::parse(&self.name).is_ok() || self.name.starts_with('/') {
			self.name.clone()
		} else {
			format!("/{}", self.name)
		}
	}
}

impl fmt::Display for FieldFile {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.name)
	}
}

/// A content type encoded as `"<app_label>_<model>"`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentTypeRef {
	value: String,
}

impl ContentTypeRef {
	pub fn new(value: impl Into<String>) -> Self {
		Self {
			value: value.into(),
		}
	}

	pub fn value(&self) -> &str {
		&self.value
	}

	pub fn app_label(&self) -> &str {
		self.value
			.split_once('_')
			.map_or(self.value.as_str(), |(app_label, _)| app_label)
	}

	pub fn model(&self) -> Option<&str> {
		self.value.split_once('_').map(|(_, model)| model)
	}
}

impl fmt::Display for ContentTypeRef {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.value)
	}
}

const NAIVE_DATETIME_FORMATS: &[&str] = &[
	"%Y-%m-%dT%H:%M:%S%.f",
	"%Y-%m-%d %H:%M:%S%.f",
	"%Y-%m-%dT%H:%M",
	"%Y-%m-%d %H:%M",
];

/// Parse a timestamp. Values without an offset are taken as UTC.
pub fn parse_datetime(value: &str) -> Option<DateTime<FixedOffset>> {
	let value = value.trim();
	if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
		return Some(parsed);
	}
	if let Ok(parsed) = DateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S%.f%:z") {
		return Some(parsed);
	}
	NAIVE_DATETIME_FORMATS
		.iter()
		.find_map(|format| NaiveDateTime::parse_from_str(value, format).ok())
		.or_else(|| {
			NaiveDate::parse_from_str(value, "%Y-%m-%d")
				.ok()
				.and_then(|date| date.and_hms_opt(0, 0, 0))
		})
		.map(|naive| naive.and_utc().fixed_offset())
}

/// Parse a date; a full timestamp yields its date part.
pub fn parse_date(value: &str) -> Option<NaiveDate> {
	let value = value.trim();
	NaiveDate::parse_from_str(value, "%Y-%m-%d")
		.ok()
		.or_else(|| parse_datetime(value).map(|dt| dt.date_naive()))
}

/// Parse a time of day; a full timestamp yields its time part.
pub fn parse_time(value: &str) -> Option<NaiveTime> {
	let value = value.trim();
	["%H:%M:%S%.f", "%H:%M"]
		.iter()
		.find_map(|format| NaiveTime::parse_from_str(value, format).ok())
		.or_else(|| {
			DateTime::parse_from_rfc3339(value)
				.ok()
				.map(|dt| dt.time())
		})
}

#[cfg(test)]
mod tests {
	use super::*;
	use chrono::{Datelike, Timelike};
	use rstest::rstest;

	#[rstest]
	#[case("2014-06-01T10:00:00Z", 10, 0)]
	#[case("2014-06-01T10:00:00+02:00", 10, 7200)]
	#[case("2014-06-01T10:00:00.123456", 10, 0)]
	#[case("2014-06-01 10:00:00", 10, 0)]
	#[case("2014-06-01", 0, 0)]
	fn test_parse_datetime(#[case] raw: &str, #[case] hour: u32, #[case] offset: i32) {
		let parsed = parse_datetime(raw).unwrap();

		assert_eq!(parsed.year(), 2014);
		assert_eq!(parsed.hour(), hour);
		assert_eq!(parsed.offset().local_minus_utc(), offset);
	}

	#[rstest]
	fn test_parse_invalid() {
		assert!(parse_datetime("yesterday").is_none());
		assert!(parse_date("2014-13-45").is_none());
		assert!(parse_time("25:00").is_none());
	}

	#[rstest]
	fn test_parse_date_and_time() {
		assert_eq!(parse_date("2014-06-01"), NaiveDate::from_ymd_opt(2014, 6, 1));
		assert_eq!(parse_time("10:30"), NaiveTime::from_hms_opt(10, 30, 0));
	}

	#[rstest]
	fn test_content_type_parts() {
		let content_type = ContentTypeRef::new("shop_order");

		assert_eq!(content_type.app_label(), "shop");
		assert_eq!(content_type.model(), Some("order"));
		assert_eq!(ContentTypeRef::new("plain").model(), None);
	}

	#[rstest]
	#[case(Field::reference("customer", "Customer"), Some("device_set"))]
	#[case(Field::reference("customer", "Customer").related_name("devices"), Some("devices"))]
	#[case(Field::reference("customer", "Customer").related_name("+"), None)]
	#[case(Field::reference("customer", "Customer").related_name("devices+"), None)]
	#[case(Field::plain("name"), None)]
	fn test_reverse_binding(#[case] field: Field, #[case] expected: Option<&str>) {
		let binding = field.reverse_binding("Device");

		assert_eq!(binding.as_ref().map(|(_, f)| f.name()), expected);
		if let Some((target, reverse)) = binding {
			assert_eq!(target, "Customer");
			assert_eq!(
				reverse.kind(),
				&FieldKind::ReverseReference {
					target: "Device".to_string(),
					field_name: "customer".to_string(),
					filters: IndexMap::new(),
					one_to_one: false,
				}
			);
		}
	}

	#[rstest]
	fn test_source_overrides_field_name() {
		let field = Field::plain("title").source("name");

		assert_eq!(field.name(), "title");
		assert_eq!(field.field_name(), "name");
	}
}
