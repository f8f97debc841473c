use std::{collections::HashMap, hash::Hash};

/// Records bucketed by key. Each bucket keeps the input order of its records.
#[derive(Debug, Clone)]
pub struct Groups<K, T> {
	buckets: HashMap<K, Vec<T>>,
}
impl<K, T> Groups<K, T>
where
	K: Eq + Hash,
{
	/// Records sharing `key`, or an empty slice when no record carried it.
	pub fn get(&self, key: &K) -> &[T] {
		self.buckets.get(key).map(Vec::as_slice).unwrap_or(&[])
	}

	pub fn contains(&self, key: &K) -> bool {
		self.buckets.contains_key(key)
	}

	/// Number of distinct keys.
	pub fn len(&self) -> usize {
		self.buckets.len()
	}

	pub fn is_empty(&self) -> bool {
		self.buckets.is_empty()
	}

	pub fn keys(&self) -> impl Iterator<Item = &K> {
		self.buckets.keys()
	}
}
impl<K, T> Default for Groups<K, T> {
	fn default() -> Self {
		Self { buckets: HashMap::new() }
	}
}

/// Groups `records` by `key`. Records whose key resolves to `None` are dropped.
pub fn group_by<K, T, I, F>(records: I, key: F) -> Groups<K, T>
where
	K: Eq + Hash,
	I: IntoIterator<Item = T>,
	F: Fn(&T) -> Option<K>,
{
	let mut buckets: HashMap<K, Vec<T>> = HashMap::new();

	for record in records {
		let Some(value) = key(&record) else {
			continue;
		};

		buckets.entry(value).or_default().push(record);
	}

	Groups { buckets }
}
