//! Path-compressed binary trie.
//!
//! Nodes live in a slab; the root sits at a fixed index and always has an
//! empty prefix. Every other node stores only the bits between itself and
//! its parent, and its first bit selects which child slot of the parent it
//! occupies. Compression keeps the tree minimal: apart from the root, a
//! node without a result always has two children.

use super::bits::{BitSlice, Bits};
use slab::Slab;

const ROOT: usize = 0;

struct Level<T> {
    prefix: Bits,
    result: Option<T>,
    children: [Option<usize>; 2],
    parent: Option<usize>,
}

impl<T> Level<T> {
    fn new(prefix: Bits, result: Option<T>, parent: Option<usize>) -> Self {
        Self {
            prefix,
            result,
            children: [None, None],
            parent,
        }
    }
}

/// Longest-prefix-match trie mapping bit strings to values.
pub struct PrefixTrie<T> {
    nodes: Slab<Level<T>>,
    results: usize,
}

impl<T> Default for PrefixTrie<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> PrefixTrie<T> {
    pub fn new() -> Self {
        let mut nodes = Slab::new();
        nodes.insert(Level::new(Bits::new(), None, None));
        Self { nodes, results: 0 }
    }

    /// Number of stored prefixes.
    pub fn len(&self) -> usize {
        self.results
    }

    pub fn is_empty(&self) -> bool {
        self.results == 0
    }

    /// Number of trie nodes, the root included.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn clear(&mut self) {
        *self = Self::new();
    }

    /// Stores `value` under `key`, returning the value it replaced.
    pub fn insert(&mut self, key: BitSlice<'_>, value: T) -> Option<T> {
        let mut node = ROOT;
        let mut rest = key;
        loop {
            if rest.is_empty() {
                let old = self.nodes[node].result.replace(value);
                if old.is_none() {
                    self.results += 1;
                }
                return old;
            }

            let slot = usize::from(rest.bit(0));
            let Some(child) = self.nodes[node].children[slot] else {
                let leaf = self
                    .nodes
                    .insert(Level::new(rest.pack(), Some(value), Some(node)));
                self.nodes[node].children[slot] = Some(leaf);
                self.results += 1;
                return None;
            };

            let child_prefix = self.nodes[child].prefix.as_slice();
            let common = child_prefix.common_prefix_len(rest);
            if common == child_prefix.len() {
                node = child;
                rest = rest.trim_prefix(common);
                continue;
            }

            // The child diverges inside its prefix: split it at the shared
            // part and hang both the child and the new key below.
            let child_rest = child_prefix.trim_prefix(common).pack();
            let mid = self
                .nodes
                .insert(Level::new(rest.truncate(common).pack(), None, Some(node)));
            self.nodes[node].children[slot] = Some(mid);
            self.nodes[mid].children[usize::from(child_rest.bit(0))] = Some(child);
            let moved = &mut self.nodes[child];
            moved.prefix = child_rest;
            moved.parent = Some(mid);

            node = mid;
            rest = rest.trim_prefix(common);
        }
    }

    /// Value stored under exactly `key`.
    pub fn get(&self, key: BitSlice<'_>) -> Option<&T> {
        self.find_node(key)
            .and_then(|node| self.nodes[node].result.as_ref())
    }

    /// Removes the value stored under exactly `key` and recompresses the
    /// path above it.
    pub fn remove(&mut self, key: BitSlice<'_>) -> Option<T> {
        let node = self.find_node(key)?;
        let value = self.nodes[node].result.take()?;
        self.results -= 1;
        self.compress(node);
        Some(value)
    }

    /// Longest stored prefix of `key`, as (prefix length, value).
    pub fn longest_match(&self, key: BitSlice<'_>) -> Option<(usize, &T)> {
        let mut node = ROOT;
        let mut rest = key;
        let mut consumed = 0;
        let mut best = None;
        loop {
            if let Some(value) = &self.nodes[node].result {
                best = Some((consumed, value));
            }
            if rest.is_empty() {
                return best;
            }
            let Some(child) = self.nodes[node].children[usize::from(rest.bit(0))] else {
                return best;
            };
            let prefix = self.nodes[child].prefix.as_slice();
            if !rest.starts_with(prefix) {
                return best;
            }
            consumed += prefix.len();
            rest = rest.trim_prefix(prefix.len());
            node = child;
        }
    }

    /// Every stored prefix with its value, depth first, zero branch before
    /// one branch.
    pub fn entries(&self) -> Vec<(Bits, &T)> {
        let mut out = Vec::with_capacity(self.results);
        let mut stack = vec![(ROOT, Bits::new())];
        while let Some((node, path)) = stack.pop() {
            let level = &self.nodes[node];
            if let Some(value) = &level.result {
                out.push((path.clone(), value));
            }
            for child in level.children.iter().rev().flatten() {
                stack.push((*child, path.concat(self.nodes[*child].prefix.as_slice())));
            }
        }
        out
    }

    /// Checks the structural invariants, returning the first violation.
    pub fn validate(&self) -> Result<(), String> {
        for (index, level) in &self.nodes {
            if index == ROOT {
                if !level.prefix.is_empty() || level.parent.is_some() {
                    return Err("root must have an empty prefix and no parent".into());
                }
            } else {
                if level.prefix.is_empty() {
                    return Err(format!("node {} has an empty prefix", index));
                }
                let Some(parent) = level.parent else {
                    return Err(format!("node {} has no parent", index));
                };
                let slot = usize::from(level.prefix.bit(0));
                if self.nodes[parent].children[slot] != Some(index) {
                    return Err(format!("node {} is not linked from its parent", index));
                }
                let children = level.children.iter().flatten().count();
                if level.result.is_none() && children != 2 {
                    return Err(format!(
                        "node {} has no result and {} children",
                        index, children
                    ));
                }
            }
            for (slot, child) in level.children.iter().enumerate() {
                if let Some(child) = child {
                    let child = &self.nodes[*child];
                    if child.parent != Some(index) || usize::from(child.prefix.bit(0)) != slot {
                        return Err(format!("node {} has a misplaced child", index));
                    }
                }
            }
        }
        Ok(())
    }

    fn find_node(&self, key: BitSlice<'_>) -> Option<usize> {
        let mut node = ROOT;
        let mut rest = key;
        while !rest.is_empty() {
            let child = self.nodes[node].children[usize::from(rest.bit(0))]?;
            let prefix = self.nodes[child].prefix.as_slice();
            if !rest.starts_with(prefix) {
                return None;
            }
            rest = rest.trim_prefix(prefix.len());
            node = child;
        }
        Some(node)
    }

    /// Walks up from a node that just lost its result, removing empty
    /// leaves and splicing out single-child pass-through nodes.
    fn compress(&mut self, mut node: usize) {
        while node != ROOT {
            let level = &self.nodes[node];
            if level.result.is_some() {
                return;
            }
            let Some(parent) = level.parent else {
                return;
            };
            let slot = usize::from(level.prefix.bit(0));
            let children = level.children;
            match children {
                [None, None] => {
                    self.nodes[parent].children[slot] = None;
                    self.nodes.remove(node);
                }
                [Some(child), None] | [None, Some(child)] => {
                    let removed = self.nodes.remove(node);
                    let spliced = &mut self.nodes[child];
                    spliced.prefix = removed.prefix.concat(spliced.prefix.as_slice());
                    spliced.parent = Some(parent);
                    self.nodes[parent].children[slot] = Some(child);
                }
                [Some(_), Some(_)] => return,
            }
            node = parent;
        }
    }
}
