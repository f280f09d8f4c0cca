//! # rest-orm shortcuts
//!
//! Convenience functions over rest-orm querysets and entities.
//!
//! Equivalent to Django's `django.shortcuts` and the model helpers of
//! `django.forms`, for models served by a REST API.
//!
//! ## Examples
//!
//! ```rust,ignore
//! use rest_orm_shortcuts::{get_object_or_404, model_to_dict};
//!
//! let customer = get_object_or_404(&customer_model.objects(), ("pk", 1))?;
//! let attrs = model_to_dict(&customer, Some(&["name", "email"]), None);
//! ```

pub mod get_or_404;
pub mod orm;

pub use get_or_404::{GetError, get_list_or_404, get_object_or_404};
pub use orm::{get_content_type_for_model, model_to_dict};
