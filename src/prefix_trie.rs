//! Binary trie over CIDR prefixes.
//!
//! Built single-threaded with [`PrefixTrie::insert`], then frozen behind an
//! `Arc` and queried concurrently. Queries walk one node per prefix bit, so
//! cost is bounded by the query's prefix length, not the number of entries.

use std::sync::Arc;

use ipnetwork::IpNetwork;

use crate::shared::{normalize_prefix, Prefix};

#[derive(Debug)]
pub struct PrefixTrieNode<T> {
    pub prefix: Option<Prefix>,
    pub values: Vec<T>,
    pub left: Option<Box<PrefixTrieNode<T>>>,
    pub right: Option<Box<PrefixTrieNode<T>>>,
}

impl<T> PrefixTrieNode<T> {
    pub fn new() -> Self {
        PrefixTrieNode {
            prefix: None,
            values: Vec::new(),
            left: None,
            right: None,
        }
    }

    fn child(&self, bit: u8) -> Option<&PrefixTrieNode<T>> {
        if bit == 0 {
            self.left.as_deref()
        } else {
            self.right.as_deref()
        }
    }

    fn child_mut_or_insert(&mut self, bit: u8) -> &mut PrefixTrieNode<T> {
        let child = if bit == 0 { &mut self.left } else { &mut self.right };
        child.get_or_insert_with(|| Box::new(PrefixTrieNode::new()))
    }
}

impl<T> Default for PrefixTrieNode<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Address bits left-aligned in a u128 so v4 and v6 share one walk.
#[derive(Debug, Clone, Copy)]
struct PrefixBits {
    bits: u128,
    len: u8,
}

impl PrefixBits {
    fn of(prefix: &Prefix) -> Self {
        match prefix {
            IpNetwork::V4(net) => PrefixBits {
                bits: (u32::from(net.network()) as u128) << 96,
                len: net.prefix(),
            },
            IpNetwork::V6(net) => PrefixBits {
                bits: u128::from(net.network()),
                len: net.prefix(),
            },
        }
    }

    fn bit(&self, index: u8) -> u8 {
        ((self.bits >> (127 - index as u32)) & 1) as u8
    }
}

/// Prefix Relation Index: answers "what covers this prefix" and "what does
/// this prefix contain".
#[derive(Debug)]
pub struct PrefixTrie<T> {
    v4_root: PrefixTrieNode<T>,
    v6_root: PrefixTrieNode<T>,
    len: usize,
}

impl<T> PrefixTrie<T> {
    pub fn new() -> Self {
        PrefixTrie {
            v4_root: PrefixTrieNode::new(),
            v6_root: PrefixTrieNode::new(),
            len: 0,
        }
    }

    /// Number of payloads stored.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Ends the build phase. The returned handle is read-only and can be
    /// shared across worker threads.
    pub fn freeze(self) -> Arc<Self> {
        Arc::new(self)
    }

    fn root(&self, prefix: &Prefix) -> &PrefixTrieNode<T> {
        match prefix {
            IpNetwork::V4(_) => &self.v4_root,
            IpNetwork::V6(_) => &self.v6_root,
        }
    }

    pub fn insert(&mut self, prefix: Prefix, payload: T) {
        let prefix = normalize_prefix(prefix);
        let bits = PrefixBits::of(&prefix);
        let mut node = match prefix {
            IpNetwork::V4(_) => &mut self.v4_root,
            IpNetwork::V6(_) => &mut self.v6_root,
        };
        for index in 0..bits.len {
            node = node.child_mut_or_insert(bits.bit(index));
        }
        node.prefix = Some(prefix);
        node.values.push(payload);
        self.len += 1;
    }

    /// Payloads stored at exactly `prefix`.
    pub fn get(&self, prefix: &Prefix) -> &[T] {
        match self.find_node(prefix) {
            Some(node) => &node.values,
            None => &[],
        }
    }

    fn find_node(&self, prefix: &Prefix) -> Option<&PrefixTrieNode<T>> {
        let bits = PrefixBits::of(prefix);
        let mut node = self.root(prefix);
        for index in 0..bits.len {
            node = node.child(bits.bit(index))?;
        }
        Some(node)
    }

    /// Every entry whose prefix contains `query` (including `query` itself),
    /// least specific first.
    pub fn covering(&self, query: &Prefix) -> Vec<(Prefix, &T)> {
        let mut entries = Vec::new();
        self.walk_covering(query, |prefix, values| {
            entries.extend(values.iter().map(|v| (prefix, v)));
        });
        entries
    }

    /// The most specific covering prefix together with all of its payloads.
    pub fn most_specific_covering(&self, query: &Prefix) -> Option<(Prefix, &[T])> {
        let mut best = None;
        self.walk_covering(query, |prefix, values| best = Some((prefix, values)));
        best
    }

    fn walk_covering<'a, F>(&'a self, query: &Prefix, mut visit: F)
    where
        F: FnMut(Prefix, &'a [T]),
    {
        let bits = PrefixBits::of(query);
        let mut node = self.root(query);
        let mut depth = 0;
        loop {
            if let (Some(prefix), false) = (node.prefix, node.values.is_empty()) {
                visit(prefix, &node.values);
            }
            if depth == bits.len {
                break;
            }
            match node.child(bits.bit(depth)) {
                Some(child) => node = child,
                None => break,
            }
            depth += 1;
        }
    }

    /// Every entry contained within `query` (including `query` itself),
    /// in pre-order.
    pub fn contained(&self, query: &Prefix) -> Vec<(Prefix, &T)> {
        let mut entries = Vec::new();
        if let Some(start) = self.find_node(query) {
            Self::collect_subtree(start, &mut entries);
        }
        entries
    }

    /// Every stored entry, v4 before v6.
    pub fn iter(&self) -> Vec<(Prefix, &T)> {
        let mut entries = Vec::with_capacity(self.len);
        Self::collect_subtree(&self.v4_root, &mut entries);
        Self::collect_subtree(&self.v6_root, &mut entries);
        entries
    }

    fn collect_subtree<'a>(start: &'a PrefixTrieNode<T>, entries: &mut Vec<(Prefix, &'a T)>) {
        let mut stack = vec![start];
        while let Some(node) = stack.pop() {
            if let Some(prefix) = node.prefix {
                entries.extend(node.values.iter().map(|v| (prefix, v)));
            }
            // right pushed first so the 0 branch is visited first
            if let Some(right) = node.right.as_deref() {
                stack.push(right);
            }
            if let Some(left) = node.left.as_deref() {
                stack.push(left);
            }
        }
    }
}

impl<T> Default for PrefixTrie<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> FromIterator<(Prefix, T)> for PrefixTrie<T> {
    fn from_iter<I: IntoIterator<Item = (Prefix, T)>>(iter: I) -> Self {
        let mut trie = PrefixTrie::new();
        for (prefix, payload) in iter {
            trie.insert(prefix, payload);
        }
        trie
    }
}
