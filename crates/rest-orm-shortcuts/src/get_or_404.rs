//! Query shortcuts with 404 error handling
//!
//! Like Django's `get_object_or_404`, these turn a lookup miss into an
//! error that maps onto an HTTP 404.

use http::StatusCode;
use rest_orm_core::Error;
use rest_orm_db::{Entity, Lookups, QuerySet};

/// Error type for get_or_404 operations
#[derive(Debug, thiserror::Error)]
pub enum GetError {
	#[error("{0}")]
	NotFound(String),
	#[error("{0}")]
	MultipleObjectsReturned(String),
	#[error("Query error: {0}")]
	Query(Error),
}

impl GetError {
	/// The HTTP status a view should answer with.
	///
	/// ```
	/// use http::StatusCode;
	/// use rest_orm_shortcuts::GetError;
	///
	/// let error = GetError::NotFound("No Customer matches the given query.".to_string());
	/// assert_eq!(error.status(), StatusCode::NOT_FOUND);
	/// ```
	pub fn status(&self) -> StatusCode {
		match self {
			GetError::NotFound(_) => StatusCode::NOT_FOUND,
			GetError::MultipleObjectsReturned(_) => StatusCode::BAD_REQUEST,
			GetError::Query(_) => StatusCode::INTERNAL_SERVER_ERROR,
		}
	}
}

/// Get the single entity of `queryset` matching `lookups`, or a 404 error
///
/// Only a lookup miss of the queryset's own model becomes
/// [`GetError::NotFound`]; a miss while dereferencing another model stays a
/// query error.
///
/// # Examples
///
/// ```rust,ignore
/// use rest_orm_shortcuts::get_object_or_404;
///
/// let customer = get_object_or_404(&customer_model.objects(), ("pk", customer_id))?;
/// ```
pub fn get_object_or_404(
	queryset: &QuerySet,
	lookups: impl Into<Lookups>,
) -> Result<Entity, GetError> {
	let model = queryset.model();
	match queryset.get(lookups) {
		Ok(entity) => Ok(entity),
		Err(error) if error.does_not_exist_for(model.name()) => Err(GetError::NotFound(format!(
			"No {} matches the given query.",
			model.object_name()
		))),
		Err(error @ Error::MultipleObjectsReturned { .. }) => {
			Err(GetError::MultipleObjectsReturned(error.to_string()))
		}
		Err(error) => {
			tracing::error!(model = model.name(), %error, "query failed in get_object_or_404");
			Err(GetError::Query(error))
		}
	}
}

/// Get every entity of `queryset`, or a 404 error if there are none
pub fn get_list_or_404(queryset: &QuerySet) -> Result<Vec<Entity>, GetError> {
	let model = queryset.model();
	let entities = queryset.to_vec().map_err(|error| {
		tracing::error!(model = model.name(), %error, "query failed in get_list_or_404");
		GetError::Query(error)
	})?;
	if entities.is_empty() {
		return Err(GetError::NotFound(format!(
			"No {} matches the given query.",
			model.object_name()
		)));
	}
	Ok(entities)
}
