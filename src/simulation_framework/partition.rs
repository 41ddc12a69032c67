use std::collections::BTreeMap;

use crate::shared::{truncate_prefix, Prefix};

/// A slice of the input that one worker owns, keyed by its covering bucket
/// prefix (e.g. the /8 of every member).
#[derive(Debug, Clone)]
pub struct Partition<T> {
    pub key: Prefix,
    pub items: Vec<T>,
}

impl<T> Partition<T> {
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Prefixes shorter than `bucket_len` form their own bucket.
pub fn partition_key(prefix: &Prefix, bucket_len: u8) -> Prefix {
    truncate_prefix(*prefix, bucket_len)
}

/// Groups items by bucket, in bucket order.
pub fn partition_by_prefix<T, I, F>(items: I, bucket_len: u8, prefix_of: F) -> Vec<Partition<T>>
where
    I: IntoIterator<Item = T>,
    F: Fn(&T) -> Prefix,
{
    let mut buckets: BTreeMap<Prefix, Vec<T>> = BTreeMap::new();
    for item in items {
        let key = partition_key(&prefix_of(&item), bucket_len);
        buckets.entry(key).or_default().push(item);
    }
    buckets
        .into_iter()
        .map(|(key, items)| Partition { key, items })
        .collect()
}
