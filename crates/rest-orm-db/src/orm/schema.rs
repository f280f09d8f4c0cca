//! Field generation from a server serializer description.
//!
//! A [`SerializerSchema`] lists the fields of a server-side serializer, for
//! instance as exported by the API's schema endpoint. Applied at
//! registration, it creates the fields a model did not declare and checks
//! the declared ones against it.

use super::fields::{Field, FieldKind};
use indexmap::IndexMap;
use rest_orm_conf::ClientSettings;
use rest_orm_core::{Error, Result};
use serde::Deserialize;

/// Description of a server serializer.
///
/// ```json
/// {
///     "name": "CustomerSerializer",
///     "primary_key": "id",
///     "fields": {
///         "name": {"type": "CharField"},
///         "created_at": {"type": "DateTimeField"},
///         "account": {"type": "PrimaryKeyRelatedField", "related_name": "customers"}
///     }
/// }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct SerializerSchema {
	/// Serializer name, used in diagnostics.
	#[serde(default)]
	pub name: Option<String>,
	/// Primary key of the server model.
	#[serde(default)]
	pub primary_key: Option<String>,
	#[serde(default)]
	pub fields: IndexMap<String, SerializerField>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SerializerField {
	/// Serializer field class, e.g. `"CharField"`.
	#[serde(rename = "type")]
	pub kind: String,
	/// `related_name` of the server foreign key behind a related field.
	#[serde(default)]
	pub related_name: Option<String>,
	/// Whether a server model field backs this serializer field.
	#[serde(default = "default_model_field")]
	pub model_field: bool,
}

fn default_model_field() -> bool {
	true
}

impl SerializerField {
	pub fn new(kind: impl Into<String>) -> Self {
		Self {
			kind: kind.into(),
			related_name: None,
			model_field: true,
		}
	}

	pub fn related_name(mut self, related_name: impl Into<String>) -> Self {
		self.related_name = Some(related_name.into());
		self
	}

	/// The field kind generated for this serializer field, if it is simple.
	fn simple_kind(&self) -> Option<FieldKind> {
		Some(match self.kind.as_str() {
			"CharField" | "EmailField" | "RegexField" | "SlugField" | "URLField" | "UUIDField"
			| "IPAddressField" | "IntegerField" | "DecimalField" | "FloatField" | "BooleanField"
			| "NullBooleanField" | "ReadOnlyField" | "ChoiceField" | "MultipleChoiceField"
			| "FilePathField" => FieldKind::Plain,
			"DateTimeField" => FieldKind::DateTime,
			"DateField" => FieldKind::Date,
			"TimeField" => FieldKind::Time,
			"FileField" | "ImageField" => FieldKind::File,
			_ => return None,
		})
	}
}

impl SerializerSchema {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn primary_key(mut self, primary_key: impl Into<String>) -> Self {
		self.primary_key = Some(primary_key.into());
		self
	}

	pub fn field(mut self, name: impl Into<String>, field: SerializerField) -> Self {
		self.fields.insert(name.into(), field);
		self
	}

	/// Parse a schema exported as JSON.
	pub fn from_json(content: &str) -> Result<Self> {
		Ok(serde_json::from_str(content)?)
	}

	/// Complete and check the declared `fields` of model `model_name`.
	///
	/// Simple serializer fields without a declaration become fields of the
	/// matching kind. A declared typed field of another kind fails with
	/// [`Error::FieldTypeMismatch`]; any declared field satisfies a plain
	/// serializer field. Other inconsistencies are only logged, when enabled
	/// in `settings`.
	pub fn apply(
		&self,
		model_name: &str,
		primary_key: &str,
		fields: &mut Vec<Field>,
		settings: &ClientSettings,
	) -> Result<()> {
		for (name, serializer_field) in &self.fields {
			let Some(kind) = serializer_field.simple_kind() else {
				continue;
			};
			let expected = generated_field(name, kind);
			match fields.iter().find(|field| field.name() == name) {
				None => {
					tracing::trace!(model = model_name, field = %name, kind = expected.type_name(), "generated field");
					fields.push(expected);
				}
				Some(declared) => {
					if *expected.kind() != FieldKind::Plain && declared.kind() != expected.kind() {
						return Err(Error::FieldTypeMismatch(format!(
							"{}.{} should be of type {}.",
							model_name,
							name,
							expected.type_name()
						)));
					}
				}
			}
		}

		if settings.missing_field_warnings {
			for (name, serializer_field) in &self.fields {
				let declared = fields.iter().any(|field| field.name() == name);
				if !declared
					&& serializer_field.simple_kind().is_none()
					&& settings.reports_missing_field(&serializer_field.kind)
				{
					tracing::warn!(
						"Missing field {}.{}. To suppress warnings of this field type add \"{}\" to suppress_missing_field_warnings_for_types",
						model_name,
						name,
						serializer_field.kind
					);
				}
			}
		}

		if settings.inconsistent_related_name_warnings {
			self.check_related_names(model_name, fields);
		}

		if settings.inconsistent_primary_key_warnings
			&& let Some(expected) = &self.primary_key
			&& expected != primary_key
		{
			tracing::warn!(
				"{} primary key should be {:?} but is {:?}",
				model_name,
				expected,
				primary_key
			);
		}

		Ok(())
	}

	fn check_related_names(&self, model_name: &str, fields: &[Field]) {
		let serializer = self.name.as_deref().unwrap_or(model_name);
		for (name, serializer_field) in &self.fields {
			if serializer_field.kind != "PrimaryKeyRelatedField" {
				continue;
			}
			let Some(declared) = fields.iter().find(|field| field.name() == name) else {
				continue;
			};
			if !serializer_field.model_field {
				tracing::warn!("Found redundant PrimaryKeyRelatedField {}.{}", serializer, name);
				continue;
			}
			let actual = match declared.kind() {
				FieldKind::Reference { related_name, .. } => related_name.as_deref(),
				_ => None,
			};
			if actual != serializer_field.related_name.as_deref() {
				tracing::warn!(
					"Wrong related_name={:?} in {}.{} (was related_name={:?})",
					serializer_field.related_name,
					model_name,
					name,
					actual
				);
			}
		}
	}
}

fn generated_field(name: &str, kind: FieldKind) -> Field {
	match kind {
		FieldKind::DateTime => Field::datetime(name),
		FieldKind::Date => Field::date(name),
		FieldKind::Time => Field::time(name),
		FieldKind::File => Field::file(name),
		_ => Field::plain(name),
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use rstest::{fixture, rstest};

	#[fixture]
	fn schema() -> SerializerSchema {
		SerializerSchema::new()
			.primary_key("id")
			.field("name", SerializerField::new("CharField"))
			.field("email", SerializerField::new("EmailField"))
			.field("created_at", SerializerField::new("DateTimeField"))
			.field("avatar", SerializerField::new("ImageField"))
			.field("tags", SerializerField::new("ListField"))
	}

	#[rstest]
	fn test_generates_missing_simple_fields(schema: SerializerSchema) {
		let mut fields = vec![Field::plain("name")];

		schema
			.apply("Customer", "id", &mut fields, &ClientSettings::default())
			.unwrap();

		let names: Vec<&str> = fields.iter().map(Field::name).collect();
		assert_eq!(names, vec!["name", "email", "created_at", "avatar"]);
		assert_eq!(fields[2].kind(), &FieldKind::DateTime);
		assert_eq!(fields[3].kind(), &FieldKind::File);
	}

	#[rstest]
	fn test_rejects_mismatched_kind(schema: SerializerSchema) {
		let mut fields = vec![Field::date("created_at")];

		let result = schema.apply("Customer", "id", &mut fields, &ClientSettings::default());

		assert!(matches!(
			result,
			Err(Error::FieldTypeMismatch(message))
				if message == "Customer.created_at should be of type DateTimeField."
		));
	}

	#[rstest]
	fn test_any_declaration_satisfies_plain(schema: SerializerSchema) {
		let mut fields = vec![Field::datetime("name")];

		let result = schema.apply(
			"Customer",
			"uuid",
			&mut fields,
			&ClientSettings::default().with_schema_warnings(true),
		);

		assert!(result.is_ok());
	}

	#[rstest]
	fn test_from_json() {
		let schema = SerializerSchema::from_json(
			r#"{
				"name": "DeviceSerializer",
				"fields": {
					"customer": {"type": "PrimaryKeyRelatedField", "related_name": "devices"},
					"serial": {"type": "CharField"}
				}
			}"#,
		)
		.unwrap();

		assert_eq!(schema.name.as_deref(), Some("DeviceSerializer"));
		assert_eq!(schema.fields["customer"].related_name.as_deref(), Some("devices"));
		assert!(schema.fields["serial"].model_field);
		assert!(schema.primary_key.is_none());
	}
}
