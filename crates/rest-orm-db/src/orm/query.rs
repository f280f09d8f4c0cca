//! Lazy querysets over a REST listing endpoint.
//!
//! A [`QuerySet`] only describes a query. Terminal operations issue the
//! listing request, at most once per queryset: clones share the result
//! cache, while every transformation starts a fresh one. Listings are read
//! page by page through their `next` links as the consumer advances.

use super::entity::Entity;
use super::indexable::{Cursor, IndexableSequence};
use super::model::Model;
use super::value::{FieldValue, Lookups};
use indexmap::IndexMap;
use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use rest_orm_core::{Error, Params, RequestScope, RestRequest, Result};
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::ops::{Bound, RangeBounds};
use std::sync::{Arc, Weak};

/// Parameters that shape a listing rather than filter it.
const RESERVED_PARAMS: [&str; 4] = ["ordering", "limit", "offset", "select_related"];

/// Lookup operators, rendered as Django-style key suffixes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FilterOp {
	/// Exact match (field = value).
	#[default]
	Exact,
	/// Case-insensitive exact match.
	IExact,
	/// Contains substring.
	Contains,
	/// Case-insensitive contains.
	IContains,
	/// Greater than.
	Gt,
	/// Greater than or equal.
	Gte,
	/// Less than.
	Lt,
	/// Less than or equal.
	Lte,
	/// Starts with.
	StartsWith,
	/// Case-insensitive starts with.
	IStartsWith,
	/// Ends with.
	EndsWith,
	/// Case-insensitive ends with.
	IEndsWith,
	/// In list of values.
	In,
	/// Is null check.
	IsNull,
	/// Range (between two values).
	Range,
}

impl FilterOp {
	/// The lookup key of `field` for this operator.
	pub fn lookup(&self, field: &str) -> String {
		let suffix = match self {
			FilterOp::Exact => return field.to_string(),
			FilterOp::IExact => "iexact",
			FilterOp::Contains => "contains",
			FilterOp::IContains => "icontains",
			FilterOp::Gt => "gt",
			FilterOp::Gte => "gte",
			FilterOp::Lt => "lt",
			FilterOp::Lte => "lte",
			FilterOp::StartsWith => "startswith",
			FilterOp::IStartsWith => "istartswith",
			FilterOp::EndsWith => "endswith",
			FilterOp::IEndsWith => "iendswith",
			FilterOp::In => "in",
			FilterOp::IsNull => "isnull",
			FilterOp::Range => "range",
		};
		format!("{}__{}", field, suffix)
	}
}

/// Materialized results of a queryset, shared by its clones.
pub(crate) struct ResultCache {
	results: OnceCell<IndexableSequence<Entity>>,
}

impl ResultCache {
	fn new() -> Arc<Self> {
		Arc::new(Self {
			results: OnceCell::new(),
		})
	}
}

/// Prefetch state of one materialized listing.
///
/// Every entity of the listing holds the group, so batching keeps working
/// after the producing queryset is dropped. The group only refers back to
/// the listing weakly.
pub(crate) struct PrefetchGroup {
	names: Vec<String>,
	listing: Weak<ResultCache>,
	/// Primary keys of the entities materialized so far.
	pks: Mutex<Vec<Value>>,
	/// Batched reverse-reference querysets and the keys they cover, by
	/// accessor name.
	batches: Mutex<HashMap<String, (Vec<Value>, QuerySet)>>,
}

impl PrefetchGroup {
	fn new(names: Vec<String>, listing: Weak<ResultCache>) -> Arc<Self> {
		Arc::new(Self {
			names,
			listing,
			pks: Mutex::new(Vec::new()),
			batches: Mutex::new(HashMap::new()),
		})
	}

	/// Whether the listing prefetches accessor `name`.
	pub(crate) fn prefetches(&self, name: &str) -> bool {
		self.names.iter().any(|n| n == name)
	}

	fn record(&self, entity: &Entity) {
		if let Some(pk) = entity.pk() {
			self.pks.lock().push(pk);
		}
	}

	/// Read the rest of the listing when it is still around, so one batch
	/// covers every page.
	fn drain_listing(&self) -> Result<()> {
		if let Some(listing) = self.listing.upgrade()
			&& let Some(results) = listing.results.get()
		{
			results.len()?;
		}
		Ok(())
	}
}

#[derive(Clone)]
enum Source {
	/// Results come from the listing endpoint.
	Remote,
	/// Results are the records of `shared` whose `field_name` key is
	/// `owner_pk`.
	Demultiplexed {
		shared: Box<QuerySet>,
		field_name: String,
		owner_pk: Value,
	},
}

/// A lazy, chainable query on a model.
///
/// # Examples
///
/// ```rust,ignore
/// let recent = device
///     .objects()
///     .filter(("customer", &acme))
///     .filter_op("created_at", FilterOp::Gte, "2014-01-01")
///     .order_by(&["-created_at"])
///     .slice(..10);
///
/// for device in recent.iter()? {
///     println!("{:?}", device?);
/// }
/// ```
#[derive(Clone)]
pub struct QuerySet {
	model: Model,
	params: IndexMap<String, FieldValue>,
	none: bool,
	prefetch_related: Vec<String>,
	scope: Option<RequestScope>,
	source: Source,
	cache: Arc<ResultCache>,
}

impl QuerySet {
	pub fn new(model: Model) -> Self {
		Self {
			model,
			params: IndexMap::new(),
			none: false,
			prefetch_related: Vec::new(),
			scope: None,
			source: Source::Remote,
			cache: ResultCache::new(),
		}
	}

	/// A copy with its own, empty result cache.
	fn derive(&self) -> Self {
		Self {
			model: self.model.clone(),
			params: self.params.clone(),
			none: self.none,
			prefetch_related: self.prefetch_related.clone(),
			scope: self.scope.clone(),
			source: Source::Remote,
			cache: ResultCache::new(),
		}
	}

	pub fn model(&self) -> &Model {
		&self.model
	}

	/// The accumulated lookup parameters, before normalization.
	pub fn params(&self) -> &IndexMap<String, FieldValue> {
		&self.params
	}

	/// Accessors prefetched for the materialized entities.
	pub fn prefetch(&self) -> &[String] {
		&self.prefetch_related
	}

	pub fn scope(&self) -> Option<&RequestScope> {
		self.scope.as_ref()
	}

	/// Serve GET calls of this queryset and its entities from `scope`.
	pub fn with_scope(&self, scope: &RequestScope) -> Self {
		self.scoped(Some(scope.clone()))
	}

	pub(crate) fn scoped(&self, scope: Option<RequestScope>) -> Self {
		let mut queryset = self.derive();
		queryset.scope = scope;
		queryset
	}

	/// Add lookups. Entity values are sent as their primary key.
	pub fn filter(&self, lookups: impl Into<Lookups>) -> Self {
		let mut queryset = self.derive();
		queryset.params.extend(lookups.into());
		queryset
	}

	/// Add a single lookup using `op`, e.g. `created_at__gte`.
	pub fn filter_op(&self, field: &str, op: FilterOp, value: impl Into<FieldValue>) -> Self {
		self.filter((op.lookup(field), value.into()))
	}

	/// Add a negated lookup, sent as `exclude__<key>`.
	///
	/// Takes exactly one lookup; chain calls to exclude several.
	pub fn exclude(&self, lookups: impl Into<Lookups>) -> Result<Self> {
		let lookups = lookups.into();
		if lookups.len() != 1 {
			return Err(Error::InvalidArgument(format!(
				"exclude takes exactly one lookup, got {}",
				lookups.len()
			)));
		}
		Ok(self.filter(
			lookups
				.into_iter()
				.map(|(key, value)| (format!("exclude__{}", key), value))
				.collect::<Lookups>(),
		))
	}

	/// Replace the ordering; a leading `-` sorts descending.
	pub fn order_by(&self, fields: &[&str]) -> Self {
		self.filter(("ordering", fields.join(",")))
	}

	/// Ask the server to embed the given references.
	pub fn select_related(&self, fields: &[&str]) -> Self {
		let mut names: Vec<String> = self
			.params
			.get("select_related")
			.and_then(FieldValue::as_str)
			.filter(|current| !current.is_empty())
			.map(|current| current.split(',').map(String::from).collect())
			.unwrap_or_default();
		names.extend(fields.iter().map(|field| field.to_string()));
		self.filter(("select_related", names.join(",")))
	}

	/// Batch one-to-many reverse references of the materialized entities.
	///
	/// The first access of such an accessor on any entity fetches the
	/// children of all of them with one `<field>__in` request.
	pub fn prefetch_related(&self, fields: &[&str]) -> Self {
		let mut queryset = self.derive();
		queryset
			.prefetch_related
			.extend(fields.iter().map(|field| field.to_string()));
		queryset.cache = ResultCache::new();
		queryset
	}

	/// The same queryset, sharing its results.
	pub fn all(&self) -> Self {
		self.clone()
	}

	/// A queryset that is always empty and never calls the server.
	pub fn none(&self) -> Self {
		let mut queryset = self.derive();
		queryset.none = true;
		queryset
	}

	fn param_key(&self, key: &str) -> String {
		if key == "pk" {
			return self.model.primary_key().to_string();
		}
		key.strip_suffix("__pk").unwrap_or(key).to_string()
	}

	/// Transmittable parameters, and whether the query is empty by
	/// construction.
	fn normalized_params(&self) -> (Params, bool) {
		let mut none = self.none;
		let mut params = Params::new();
		for (key, value) in &self.params {
			if value.is_empty_list() && !key.starts_with("exclude__") {
				none = true;
			}
			params.insert(self.param_key(key), value.to_param());
		}
		(params, none)
	}

	fn param_usize(&self, key: &str) -> Option<usize> {
		self.params
			.get(key)
			.and_then(FieldValue::as_i64)
			.and_then(|value| usize::try_from(value).ok())
	}

	/// Narrow to `range` of the current results.
	///
	/// Offsets and limits compose with earlier slices: `slice(10..20)`
	/// followed by `slice(5..10)` addresses items 15 to 19.
	pub fn slice(&self, range: impl RangeBounds<usize>) -> Self {
		let start = match range.start_bound() {
			Bound::Included(start) => *start,
			Bound::Excluded(start) => start.saturating_add(1),
			Bound::Unbounded => 0,
		};
		let stop = match range.end_bound() {
			Bound::Included(end) => Some(end.saturating_add(1)),
			Bound::Excluded(end) => Some(*end),
			Bound::Unbounded => None,
		};

		let mut queryset = self.derive();
		let offset = self.param_usize("offset").unwrap_or(0).saturating_add(start);
		if offset != 0 {
			queryset.params.insert("offset".to_string(), offset.into());
		}

		let limit = match (self.param_usize("limit"), stop) {
			(Some(limit), Some(stop)) => Some(limit.min(stop)),
			(limit, stop) => limit.or(stop),
		};
		if let Some(limit) = limit {
			let limit = limit.saturating_sub(start);
			queryset.params.insert("limit".to_string(), limit.into());
			if limit == 0 {
				queryset.none = true;
			}
		}
		queryset
	}

	/// Every `step`-th item of `range`; a step above one materializes the
	/// slice.
	pub fn slice_step(&self, range: impl RangeBounds<usize>, step: usize) -> Result<Vec<Entity>> {
		if step == 0 {
			return Err(Error::InvalidArgument("slice step cannot be zero".to_string()));
		}
		let queryset = self.slice(range);
		if step == 1 {
			return queryset.to_vec();
		}
		queryset.results()?.slice_step(.., step)
	}

	/// The item at `index`, fetched with `limit=1`; `None` past the end.
	pub fn at(&self, index: usize) -> Result<Option<Entity>> {
		let mut queryset = self.derive();
		let offset = self.param_usize("offset").unwrap_or(0).saturating_add(index);
		if offset != 0 {
			queryset.params.insert("offset".to_string(), offset.into());
		} else {
			queryset.params.shift_remove("offset");
		}
		queryset.params.insert("limit".to_string(), 1.into());
		queryset.results()?.get(0)
	}

	/// The single entity matching `lookups`.
	///
	/// A lookup on the primary key alone fetches the resource directly;
	/// anything else lists with `limit=1` and checks the reported count.
	pub fn get(&self, lookups: impl Into<Lookups>) -> Result<Entity> {
		let queryset = self.filter(lookups);
		let (mut params, none) = queryset.normalized_params();
		if none {
			return Err(Error::does_not_exist(self.model.name()));
		}

		let primary_key = self.model.primary_key();
		let by_pk = params
			.keys()
			.filter(|key| *key != "select_related")
			.eq([primary_key].into_iter());

		let record = if by_pk {
			let pk = params.shift_remove(primary_key).unwrap_or(Value::Null);
			let request = RestRequest::get(self.model.resource_url(&pk)?).with_params(params);
			self.model
				.rest_call(&request, self.scope.as_ref())?
				.ok_or_else(|| {
					Error::UnexpectedResponse(format!("empty {} record", self.model.name()))
				})?
		} else {
			params.insert("limit".to_string(), 1.into());
			let request = RestRequest::get(self.model.resources_url()?).with_params(params);
			let page = Page::parse(&self.model, self.model.rest_call(&request, self.scope.as_ref())?)?;
			match page.count {
				0 => return Err(Error::does_not_exist(self.model.name())),
				1 => page.results.into_iter().next().ok_or_else(|| {
					Error::UnexpectedResponse(format!(
						"{} listing reported one match but returned none",
						self.model.name()
					))
				})?,
				count => {
					return Err(Error::MultipleObjectsReturned {
						model: self.model.name().to_string(),
						count,
					});
				}
			}
		};

		Entity::materialize(&self.model, record, self.scope.clone(), None)
	}

	/// Get the match of `lookups` or create it; the flag tells whether it
	/// was created.
	pub fn get_or_create(&self, lookups: impl Into<Lookups>) -> Result<(Entity, bool)> {
		let lookups = lookups.into();
		match self.get(lookups.clone()) {
			Ok(entity) => Ok((entity, false)),
			Err(error) if error.does_not_exist_for(self.model.name()) => {
				Ok((self.create(lookups)?, true))
			}
			Err(error) => Err(error),
		}
	}

	pub fn first(&self) -> Result<Option<Entity>> {
		self.at(0)
	}

	/// The last entity in the current ordering, or by primary key.
	pub fn last(&self) -> Result<Option<Entity>> {
		let ordering = self
			.params
			.get("ordering")
			.and_then(FieldValue::as_str)
			.map(String::from)
			.unwrap_or_else(|| self.model.primary_key().to_string());
		let inverted: Vec<String> = ordering
			.split(',')
			.map(|field| match field.strip_prefix('-') {
				Some(ascending) => ascending.to_string(),
				None => format!("-{}", field),
			})
			.collect();
		self.filter(("ordering", inverted.join(","))).first()
	}

	fn latest_by(&self, field: Option<&str>) -> Result<String> {
		field
			.or(self.model.get_latest_by())
			.map(String::from)
			.ok_or_else(|| {
				Error::InvalidArgument(
					"earliest() and latest() require either a field name or get_latest_by on the model"
						.to_string(),
				)
			})
	}

	/// The first entity ordered by `field` or the model's `get_latest_by`.
	pub fn earliest(&self, field: Option<&str>) -> Result<Entity> {
		self.filter(("ordering", self.latest_by(field)?))
			.first()?
			.ok_or_else(|| Error::does_not_exist(self.model.name()))
	}

	/// The last entity ordered by `field` or the model's `get_latest_by`.
	pub fn latest(&self, field: Option<&str>) -> Result<Entity> {
		self.filter(("ordering", self.latest_by(field)?))
			.last()?
			.ok_or_else(|| Error::does_not_exist(self.model.name()))
	}

	pub fn exists(&self) -> Result<bool> {
		Ok(self.first()?.is_some())
	}

	/// The number of matches as reported by the server.
	pub fn count(&self) -> Result<usize> {
		if let Source::Demultiplexed { .. } = self.source {
			return self.len();
		}
		let (mut params, none) = self.normalized_params();
		if none {
			return Ok(0);
		}
		params.insert("limit".to_string(), 1.into());
		let request = RestRequest::get(self.model.resources_url()?).with_params(params);
		let page = Page::parse(&self.model, self.model.rest_call(&request, self.scope.as_ref())?)?;
		usize::try_from(page.count)
			.map_err(|_| Error::UnexpectedResponse(format!("count {} out of range", page.count)))
	}

	/// Current lookups usable as attributes of a new entity.
	fn defaults(&self) -> Lookups {
		self.params
			.iter()
			.filter(|(key, _)| !RESERVED_PARAMS.contains(&key.as_str()) && !key.contains("__"))
			.map(|(key, value)| (key.clone(), value.clone()))
			.collect()
	}

	/// An unsaved entity with the queryset's lookups as defaults.
	pub fn new_entity(&self, attrs: impl Into<Lookups>) -> Entity {
		let mut merged = self.defaults();
		merged.extend(attrs.into());
		Entity::new_scoped(&self.model, merged, self.scope.clone())
	}

	/// Create and save an entity.
	pub fn create(&self, attrs: impl Into<Lookups>) -> Result<Entity> {
		let entity = self.new_entity(attrs);
		entity.save()?;
		Ok(entity)
	}

	/// Apply the queryset's lookups to `entity` and save it.
	///
	/// ```rust,ignore
	/// acme.related_set("devices")?.add(&device)?;
	/// ```
	pub fn add(&self, entity: &Entity) -> Result<()> {
		let queryset = QuerySet {
			params: self.defaults().into_inner(),
			..self.derive()
		};
		let (params, _) = queryset.normalized_params();
		entity.assign_current(params);
		entity.save()
	}

	/// A cursor over the results, materializing them on first use.
	pub fn iter(&self) -> Result<Cursor<Entity>> {
		Ok(self.results()?.iter())
	}

	/// Number of results; reads every page.
	pub fn len(&self) -> Result<usize> {
		self.results()?.len()
	}

	pub fn is_empty(&self) -> Result<bool> {
		self.results()?.is_empty()
	}

	pub fn to_vec(&self) -> Result<Vec<Entity>> {
		self.results()?.to_vec()
	}

	pub fn contains(&self, entity: &Entity) -> Result<bool> {
		for item in self.iter()? {
			if item? == *entity {
				return Ok(true);
			}
		}
		Ok(false)
	}

	/// Render the first results, like a list.
	pub fn repr(&self) -> Result<String> {
		self.results()?.preview()
	}

	fn results(&self) -> Result<IndexableSequence<Entity>> {
		self.cache
			.results
			.get_or_try_init(|| self.fetch_results())
			.cloned()
	}

	fn fetch_results(&self) -> Result<IndexableSequence<Entity>> {
		if let Source::Demultiplexed {
			shared,
			field_name,
			owner_pk,
		} = &self.source
		{
			let mut matching = Vec::new();
			for entity in shared.iter()? {
				let entity = entity?;
				if entity.reference_key(field_name).as_ref() == Some(owner_pk) {
					matching.push(entity);
				}
			}
			return Ok(IndexableSequence::from_vec(matching));
		}

		let (params, none) = self.normalized_params();
		if none {
			return Ok(IndexableSequence::empty());
		}
		let limit = params
			.get("limit")
			.and_then(Value::as_u64)
			.and_then(|limit| usize::try_from(limit).ok());

		let request = RestRequest::get(self.model.resources_url()?).with_params(params);
		let page = Page::parse(&self.model, self.model.rest_call(&request, self.scope.as_ref())?)?;
		tracing::trace!(model = self.model.name(), count = page.count, "materialized listing");

		let group = (!self.prefetch_related.is_empty()).then(|| {
			PrefetchGroup::new(self.prefetch_related.clone(), Arc::downgrade(&self.cache))
		});
		let pages = PageIter {
			model: self.model.clone(),
			scope: self.scope.clone(),
			group,
			pending: page.results.into(),
			next: page.next,
			remaining: limit,
		};
		Ok(IndexableSequence::new(pages))
	}

	/// The queryset of a prefetched reverse reference of one entity.
	///
	/// The children of every entity in `group` are fetched once, through
	/// a queryset kept in `group`, and filtered locally by `owner_pk`. An
	/// owner materialized after the batch was built starts a new batch.
	pub(crate) fn prefetched_view(
		group: &Arc<PrefetchGroup>,
		name: &str,
		target: &Model,
		field_name: &str,
		filters: Lookups,
		owner_pk: Value,
		scope: Option<RequestScope>,
	) -> Result<Self> {
		group.drain_listing()?;
		let shared = {
			let mut batches = group.batches.lock();
			match batches.get(name) {
				Some((covered, shared)) if covered.contains(&owner_pk) => shared.clone(),
				_ => {
					let pks = group.pks.lock().clone();
					let mut lookups = filters.clone();
					lookups.insert(
						format!("{}__in", field_name),
						FieldValue::Json(Value::Array(pks.clone())),
					);
					let shared = QuerySet::new(target.clone()).scoped(scope.clone()).filter(lookups);
					batches.insert(name.to_string(), (pks, shared.clone()));
					shared
				}
			}
		};

		let mut view = QuerySet::new(target.clone())
			.scoped(scope)
			.filter(filters)
			.filter((field_name, owner_pk.clone()));
		view.source = Source::Demultiplexed {
			shared: Box::new(shared),
			field_name: field_name.to_string(),
			owner_pk,
		};
		Ok(view)
	}
}

impl fmt::Debug for QuerySet {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("QuerySet")
			.field("model", &self.model.name())
			.field("params", &self.params)
			.field("none", &self.none)
			.field("prefetch_related", &self.prefetch_related)
			.finish()
	}
}

/// One page of a listing.
struct Page {
	results: Vec<Value>,
	count: u64,
	next: Option<String>,
}

impl Page {
	/// Read a paginated listing, or a bare list of records.
	fn parse(model: &Model, body: Option<Value>) -> Result<Self> {
		match body {
			Some(Value::Array(results)) => Ok(Self {
				count: results.len() as u64,
				results,
				next: None,
			}),
			Some(Value::Object(mut page)) => {
				let results = match page.remove("results") {
					Some(Value::Array(results)) => results,
					_ => {
						return Err(Error::UnexpectedResponse(format!(
							"{} listing has no results",
							model.name()
						)));
					}
				};
				let count = page
					.get("count")
					.and_then(Value::as_u64)
					.unwrap_or(results.len() as u64);
				let next = page
					.get("next")
					.and_then(Value::as_str)
					.filter(|next| !next.is_empty())
					.map(String::from);
				Ok(Self {
					results,
					count,
					next,
				})
			}
			other => Err(Error::UnexpectedResponse(format!(
				"expected a {} listing, got {}",
				model.name(),
				other.unwrap_or(Value::Null)
			))),
		}
	}
}

/// Materializes records page by page, following `next` links on demand.
///
/// A failed page or record stays pending, so pulling again retries it
/// instead of skipping it.
struct PageIter {
	model: Model,
	scope: Option<RequestScope>,
	group: Option<Arc<PrefetchGroup>>,
	pending: VecDeque<Value>,
	next: Option<String>,
	/// Records still allowed by the listing's `limit`.
	remaining: Option<usize>,
}

impl Iterator for PageIter {
	type Item = Result<Entity>;

	fn next(&mut self) -> Option<Self::Item> {
		if self.remaining == Some(0) {
			return None;
		}
		loop {
			if let Some(record) = self.pending.front() {
				let entity = match Entity::materialize(
					&self.model,
					record.clone(),
					self.scope.clone(),
					self.group.clone(),
				) {
					Ok(entity) => entity,
					Err(error) => return Some(Err(error)),
				};
				self.pending.pop_front();
				if let Some(remaining) = self.remaining.as_mut() {
					*remaining -= 1;
				}
				if let Some(group) = &self.group {
					group.record(&entity);
				}
				return Some(Ok(entity));
			}

			let url = self.next.take()?;
			tracing::debug!(model = self.model.name(), %url, "fetching next page");
			let page = self
				.model
				.rest_call(&RestRequest::get(url.clone()), self.scope.as_ref())
				.and_then(|body| Page::parse(&self.model, body));
			match page {
				Ok(page) => {
					self.pending = page.results.into();
					self.next = page.next;
				}
				Err(error) => {
					// Retried on the next pull.
					self.next = Some(url);
					return Some(Err(error));
				}
			}
		}
	}
}
