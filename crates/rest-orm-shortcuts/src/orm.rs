//! Model helpers for entities

use indexmap::IndexMap;
use rest_orm_db::{Entity, FieldValue};

/// The current attributes of `entity`, optionally restricted to `fields`
/// and without `exclude`.
///
/// # Examples
///
/// ```rust,ignore
/// let attrs = model_to_dict(&customer, Some(&["name", "email"]), None);
/// assert_eq!(attrs.len(), 2);
/// ```
pub fn model_to_dict(
	entity: &Entity,
	fields: Option<&[&str]>,
	exclude: Option<&[&str]>,
) -> IndexMap<String, FieldValue> {
	entity
		.attrs()
		.into_iter()
		.filter(|(key, _)| fields.is_none_or(|fields| fields.contains(&key.as_str())))
		.filter(|(key, _)| !exclude.is_some_and(|exclude| exclude.contains(&key.as_str())))
		.collect()
}

/// The content type declared by the model of `entity`.
pub fn get_content_type_for_model(entity: &Entity) -> Option<String> {
	entity.model().content_type().map(String::from)
}
