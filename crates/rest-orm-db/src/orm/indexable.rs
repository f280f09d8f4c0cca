//! Memoizing random access over a lazy, one-directional source.
//!
//! [`IndexableSequence`] pulls items from its source only as far as the
//! caller needs and remembers everything pulled. Any number of [`Cursor`]s
//! can walk the same sequence; they share the memo, so no item is ever
//! pulled twice.

use parking_lot::Mutex;
use rest_orm_core::Result;
use std::fmt;
use std::ops::{Bound, RangeBounds};
use std::sync::Arc;

/// Items shown by [`IndexableSequence::preview`].
const PREVIEW_ITEMS: usize = 10;

type Source<T> = Box<dyn Iterator<Item = Result<T>> + Send>;

struct Inner<T> {
	memo: Vec<T>,
	source: Option<Source<T>>,
}

/// A lazily filled, shared, random-access sequence.
///
/// Clones share the memo and the source.
pub struct IndexableSequence<T> {
	inner: Arc<Mutex<Inner<T>>>,
}

impl<T> Clone for IndexableSequence<T> {
	fn clone(&self) -> Self {
		Self {
			inner: Arc::clone(&self.inner),
		}
	}
}

impl<T: Clone> IndexableSequence<T> {
	/// Wrap a lazy source.
	pub fn new<I>(source: I) -> Self
	where
		I: Iterator<Item = Result<T>> + Send + 'static,
	{
		Self {
			inner: Arc::new(Mutex::new(Inner {
				memo: Vec::new(),
				source: Some(Box::new(source)),
			})),
		}
	}

	/// A sequence whose items are all known up front.
	pub fn from_vec(items: Vec<T>) -> Self {
		Self {
			inner: Arc::new(Mutex::new(Inner {
				memo: items,
				source: None,
			})),
		}
	}

	pub fn empty() -> Self {
		Self::from_vec(Vec::new())
	}

	/// Pull from the source until `count` items are memoized or the source
	/// is exhausted. Returns whether `count` items are available.
	fn fill(&self, count: usize) -> Result<bool> {
		let mut inner = self.inner.lock();
		while inner.memo.len() < count {
			let next = match inner.source.as_mut() {
				Some(source) => source.next(),
				None => return Ok(false),
			};
			match next {
				Some(Ok(item)) => inner.memo.push(item),
				Some(Err(error)) => return Err(error),
				None => {
					inner.source = None;
					return Ok(false);
				}
			}
		}
		Ok(true)
	}

	/// The item at `index`, pulling only as far as needed.
	pub fn get(&self, index: usize) -> Result<Option<T>> {
		self.fill(index.saturating_add(1))?;
		Ok(self.inner.lock().memo.get(index).cloned())
	}

	/// The items within `range`, clipped to the available items.
	pub fn slice(&self, range: impl RangeBounds<usize>) -> Result<Vec<T>> {
		let start = match range.start_bound() {
			Bound::Included(start) => *start,
			Bound::Excluded(start) => start.saturating_add(1),
			Bound::Unbounded => 0,
		};
		let end = match range.end_bound() {
			Bound::Included(end) => Some(end.saturating_add(1)),
			Bound::Excluded(end) => Some(*end),
			Bound::Unbounded => None,
		};

		match end {
			Some(end) => {
				self.fill(end)?;
			}
			None => {
				self.fill(usize::MAX)?;
			}
		}

		let inner = self.inner.lock();
		let end = end.unwrap_or(inner.memo.len()).min(inner.memo.len());
		if start >= end {
			return Ok(Vec::new());
		}
		Ok(inner.memo[start..end].to_vec())
	}

	/// Every `step`-th item within `range`.
	pub fn slice_step(&self, range: impl RangeBounds<usize>, step: usize) -> Result<Vec<T>> {
		Ok(self
			.slice(range)?
			.into_iter()
			.step_by(step.max(1))
			.collect())
	}

	/// An independent cursor starting at the first item.
	pub fn iter(&self) -> Cursor<T> {
		Cursor {
			sequence: self.clone(),
			position: 0,
		}
	}

	/// Number of items; drains the source.
	pub fn len(&self) -> Result<usize> {
		self.fill(usize::MAX)?;
		Ok(self.inner.lock().memo.len())
	}

	/// Whether the sequence has no items; pulls at most one.
	pub fn is_empty(&self) -> Result<bool> {
		Ok(!self.fill(1)?)
	}

	/// Every item; drains the source.
	pub fn to_vec(&self) -> Result<Vec<T>> {
		self.slice(..)
	}

	/// Number of items pulled so far.
	pub fn fetched(&self) -> usize {
		self.inner.lock().memo.len()
	}

	/// Render the first items, marking truncation when more exist.
	pub fn preview(&self) -> Result<String>
	where
		T: fmt::Debug,
	{
		let more = self.fill(PREVIEW_ITEMS + 1)?;
		let inner = self.inner.lock();
		let shown = inner.memo.len().min(PREVIEW_ITEMS);
		let mut rendered: Vec<String> = inner.memo[..shown]
			.iter()
			.map(|item| format!("{:?}", item))
			.collect();
		if more {
			rendered.push("...(remaining elements truncated)...".to_string());
		}
		Ok(format!("[{}]", rendered.join(", ")))
	}
}

impl<T> fmt::Debug for IndexableSequence<T> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let inner = self.inner.lock();
		f.debug_struct("IndexableSequence")
			.field("fetched", &inner.memo.len())
			.field("exhausted", &inner.source.is_none())
			.finish()
	}
}

/// A cursor over an [`IndexableSequence`].
pub struct Cursor<T> {
	sequence: IndexableSequence<T>,
	position: usize,
}

impl<T: Clone> Iterator for Cursor<T> {
	type Item = Result<T>;

	fn next(&mut self) -> Option<Self::Item> {
		match self.sequence.get(self.position) {
			Ok(Some(item)) => {
				self.position += 1;
				Some(Ok(item))
			}
			Ok(None) => None,
			Err(error) => Some(Err(error)),
		}
	}
}
