//! Remote ORM: models, entities and querysets backed by a REST API.

pub mod entity;
pub mod fields;
pub mod indexable;
pub mod method;
pub mod model;
pub mod query;
pub mod registry;
pub mod schema;
pub mod value;

pub use entity::{Entity, Resolved};
pub use fields::{ContentTypeRef, Field, FieldFile, FieldKind};
pub use indexable::{Cursor, IndexableSequence};
pub use method::{MethodOutput, RemoteMethod};
pub use model::{Model, ModelBuilder};
pub use query::{FilterOp, QuerySet};
pub use registry::Registry;
pub use schema::{SerializerField, SerializerSchema};
pub use value::{FieldValue, Lookups};

pub use rest_orm_core::{Error, Method, RequestScope, Result};
