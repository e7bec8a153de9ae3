//! Left-leaning red-black tree with exclusively owned nodes
//!
//! Every node is owned by the slot of its parent (or the root slot). Removal
//! moves the node out of its slot and drops it, so there is no manual
//! allocate/free pairing. Lookup, insert, remove and extraction of either
//! extreme are all O(log n).

use std::cmp::Ordering;
use std::mem;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Color {
    Red,
    Black,
}

impl Color {
    fn flip(self) -> Self {
        match self {
            Color::Red => Color::Black,
            Color::Black => Color::Red,
        }
    }
}

type Link<K, V> = Option<Box<Node<K, V>>>;

#[derive(Debug)]
struct Node<K, V> {
    key: K,
    value: V,
    color: Color,
    left: Link<K, V>,
    right: Link<K, V>,
}

impl<K, V> Node<K, V> {
    fn new(key: K, value: V) -> Box<Self> {
        Box::new(Node {
            key,
            value,
            color: Color::Red,
            left: None,
            right: None,
        })
    }
}

/// Balanced ordered map keyed by `K`.
#[derive(Debug)]
pub struct RbTree<K, V> {
    root: Link<K, V>,
    len: usize,
}

impl<K: Ord, V> Default for RbTree<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Ord, V> RbTree<K, V> {
    /// Create an empty tree
    pub fn new() -> Self {
        Self { root: None, len: 0 }
    }

    /// Number of entries in the tree
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Point lookup without mutation.
    pub fn get(&self, key: &K) -> Option<&V> {
        let mut cursor = self.root.as_deref();
        while let Some(node) = cursor {
            cursor = match key.cmp(&node.key) {
                Ordering::Less => node.left.as_deref(),
                Ordering::Greater => node.right.as_deref(),
                Ordering::Equal => return Some(&node.value),
            };
        }
        None
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.get(key).is_some()
    }

    /// Insert `value` under `key`.
    ///
    /// An existing key keeps its node and has its value overwritten; the
    /// previous value is returned.
    pub fn insert(&mut self, key: K, value: V) -> Option<V> {
        let (mut root, replaced) = insert_at(self.root.take(), key, value);
        root.color = Color::Black;
        self.root = Some(root);
        if replaced.is_none() {
            self.len += 1;
        }
        replaced
    }

    /// Remove `key`, returning its value. Absent keys leave the tree untouched.
    pub fn remove(&mut self, key: &K) -> Option<V> {
        if !self.contains_key(key) {
            return None;
        }
        let mut root = self.root.take()?;
        if !is_red(&root.left) && !is_red(&root.right) {
            root.color = Color::Red;
        }
        let (rest, removed) = delete(root, key);
        self.set_root(rest);
        if removed.is_some() {
            self.len -= 1;
        }
        removed
    }

    /// Unlink and return the smallest entry.
    pub fn pop_first(&mut self) -> Option<(K, V)> {
        let mut root = self.root.take()?;
        if !is_red(&root.left) && !is_red(&root.right) {
            root.color = Color::Red;
        }
        let (rest, entry) = delete_min(root);
        self.set_root(rest);
        self.len -= 1;
        Some(entry)
    }

    /// Unlink and return the largest entry.
    pub fn pop_last(&mut self) -> Option<(K, V)> {
        let mut root = self.root.take()?;
        if !is_red(&root.left) && !is_red(&root.right) {
            root.color = Color::Red;
        }
        let (rest, entry) = delete_max(root);
        self.set_root(rest);
        self.len -= 1;
        Some(entry)
    }

    pub fn first(&self) -> Option<(&K, &V)> {
        let mut node = self.root.as_deref()?;
        while let Some(left) = node.left.as_deref() {
            node = left;
        }
        Some((&node.key, &node.value))
    }

    pub fn last(&self) -> Option<(&K, &V)> {
        let mut node = self.root.as_deref()?;
        while let Some(right) = node.right.as_deref() {
            node = right;
        }
        Some((&node.key, &node.value))
    }

    /// Drop every node
    pub fn clear(&mut self) {
        self.root = None;
        self.len = 0;
    }

    /// In-order iterator, ascending by key.
    pub fn iter(&self) -> Iter<'_, K, V> {
        let mut iter = Iter {
            stack: Vec::new(),
            remaining: self.len,
        };
        iter.push_left(self.root.as_deref());
        iter
    }

    fn set_root(&mut self, root: Link<K, V>) {
        self.root = root;
        if let Some(root) = self.root.as_mut() {
            root.color = Color::Black;
        }
    }
}

pub struct Iter<'a, K, V> {
    stack: Vec<&'a Node<K, V>>,
    remaining: usize,
}

impl<'a, K, V> Iter<'a, K, V> {
    fn push_left(&mut self, mut cursor: Option<&'a Node<K, V>>) {
        while let Some(node) = cursor {
            self.stack.push(node);
            cursor = node.left.as_deref();
        }
    }
}

impl<'a, K, V> Iterator for Iter<'a, K, V> {
    type Item = (&'a K, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.stack.pop()?;
        self.push_left(node.right.as_deref());
        self.remaining = self.remaining.saturating_sub(1);
        Some((&node.key, &node.value))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<'a, K: Ord, V> IntoIterator for &'a RbTree<K, V> {
    type Item = (&'a K, &'a V);
    type IntoIter = Iter<'a, K, V>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

fn is_red<K, V>(link: &Link<K, V>) -> bool {
    matches!(link, Some(node) if node.color == Color::Red)
}

/// Whether the left child of the node in `link` is red.
fn is_left_red<K, V>(link: &Link<K, V>) -> bool {
    link.as_ref().is_some_and(|node| is_red(&node.left))
}

fn rotate_left<K, V>(mut h: Box<Node<K, V>>) -> Box<Node<K, V>> {
    let Some(mut x) = h.right.take() else {
        return h;
    };
    h.right = x.left.take();
    x.color = h.color;
    h.color = Color::Red;
    x.left = Some(h);
    x
}

fn rotate_right<K, V>(mut h: Box<Node<K, V>>) -> Box<Node<K, V>> {
    let Some(mut x) = h.left.take() else {
        return h;
    };
    h.left = x.right.take();
    x.color = h.color;
    h.color = Color::Red;
    x.right = Some(h);
    x
}

fn flip_colors<K, V>(h: &mut Node<K, V>) {
    h.color = h.color.flip();
    if let Some(left) = h.left.as_mut() {
        left.color = left.color.flip();
    }
    if let Some(right) = h.right.as_mut() {
        right.color = right.color.flip();
    }
}

/// Restore the left-leaning invariants on the way back up.
fn balance<K, V>(mut h: Box<Node<K, V>>) -> Box<Node<K, V>> {
    if is_red(&h.right) && !is_red(&h.left) {
        h = rotate_left(h);
    }
    if is_red(&h.left) && is_left_red(&h.left) {
        h = rotate_right(h);
    }
    if is_red(&h.left) && is_red(&h.right) {
        flip_colors(&mut h);
    }
    h
}

fn move_red_left<K, V>(mut h: Box<Node<K, V>>) -> Box<Node<K, V>> {
    flip_colors(&mut h);
    if is_left_red(&h.right) {
        if let Some(right) = h.right.take() {
            h.right = Some(rotate_right(right));
        }
        h = rotate_left(h);
        flip_colors(&mut h);
    }
    h
}

fn move_red_right<K, V>(mut h: Box<Node<K, V>>) -> Box<Node<K, V>> {
    flip_colors(&mut h);
    if is_left_red(&h.left) {
        h = rotate_right(h);
        flip_colors(&mut h);
    }
    h
}

fn insert_at<K: Ord, V>(link: Link<K, V>, key: K, value: V) -> (Box<Node<K, V>>, Option<V>) {
    let Some(mut h) = link else {
        return (Node::new(key, value), None);
    };
    let replaced = match key.cmp(&h.key) {
        Ordering::Less => {
            let (child, replaced) = insert_at(h.left.take(), key, value);
            h.left = Some(child);
            replaced
        }
        Ordering::Greater => {
            let (child, replaced) = insert_at(h.right.take(), key, value);
            h.right = Some(child);
            replaced
        }
        Ordering::Equal => Some(mem::replace(&mut h.value, value)),
    };
    (balance(h), replaced)
}

fn delete_min<K, V>(mut h: Box<Node<K, V>>) -> (Link<K, V>, (K, V)) {
    if h.left.is_none() {
        let Node { key, value, right, .. } = *h;
        return (right, (key, value));
    }
    if !is_red(&h.left) && !is_left_red(&h.left) {
        h = move_red_left(h);
    }
    match h.left.take() {
        Some(left) => {
            let (rest, min) = delete_min(left);
            h.left = rest;
            (Some(balance(h)), min)
        }
        None => {
            let Node { key, value, right, .. } = *h;
            (right, (key, value))
        }
    }
}

fn delete_max<K, V>(mut h: Box<Node<K, V>>) -> (Link<K, V>, (K, V)) {
    if is_red(&h.left) {
        h = rotate_right(h);
    }
    if h.right.is_none() {
        let Node { key, value, left, .. } = *h;
        return (left, (key, value));
    }
    if !is_red(&h.right) && !is_left_red(&h.right) {
        h = move_red_right(h);
    }
    match h.right.take() {
        Some(right) => {
            let (rest, max) = delete_max(right);
            h.right = rest;
            (Some(balance(h)), max)
        }
        None => {
            let Node { key, value, left, .. } = *h;
            (left, (key, value))
        }
    }
}

/// Remove `key` from the subtree rooted at `h`. The key must be present.
fn delete<K: Ord, V>(mut h: Box<Node<K, V>>, key: &K) -> (Link<K, V>, Option<V>) {
    let removed;
    if *key < h.key {
        if !is_red(&h.left) && !is_left_red(&h.left) {
            h = move_red_left(h);
        }
        removed = match h.left.take() {
            Some(left) => {
                let (rest, removed) = delete(left, key);
                h.left = rest;
                removed
            }
            None => None,
        };
    } else {
        if is_red(&h.left) {
            h = rotate_right(h);
        }
        if *key == h.key && h.right.is_none() {
            let Node { value, left, .. } = *h;
            return (left, Some(value));
        }
        if !is_red(&h.right) && !is_left_red(&h.right) {
            h = move_red_right(h);
        }
        let right = h.right.take();
        removed = match (key.cmp(&h.key), right) {
            (Ordering::Equal, Some(right)) => {
                let (rest, (succ_key, succ_value)) = delete_min(right);
                h.right = rest;
                h.key = succ_key;
                Some(mem::replace(&mut h.value, succ_value))
            }
            (Ordering::Equal, None) => {
                let Node { value, left, .. } = *h;
                return (left, Some(value));
            }
            (_, Some(right)) => {
                let (rest, removed) = delete(right, key);
                h.right = rest;
                removed
            }
            (_, None) => None,
        };
    }
    (Some(balance(h)), removed)
}

#[cfg(test)]
impl<K: Ord, V> RbTree<K, V> {
    /// Check the red-black invariants, returning a description of the first
    /// violation found.
    fn check_invariants(&self) -> std::result::Result<(), String> {
        fn walk<K: Ord, V>(
            link: &Link<K, V>,
            lower: Option<&K>,
            upper: Option<&K>,
            count: &mut usize,
        ) -> std::result::Result<usize, String> {
            let Some(node) = link else {
                return Ok(1);
            };
            *count += 1;
            if lower.is_some_and(|lower| node.key <= *lower) || upper.is_some_and(|upper| node.key >= *upper) {
                return Err("keys out of order".to_string());
            }
            if is_red(&node.right) {
                return Err("red right link".to_string());
            }
            if node.color == Color::Red && is_red(&node.left) {
                return Err("two red links in a row".to_string());
            }
            let left = walk(&node.left, lower, Some(&node.key), count)?;
            let right = walk(&node.right, Some(&node.key), upper, count)?;
            if left != right {
                return Err(format!("black height mismatch: {} vs {}", left, right));
            }
            Ok(left + usize::from(node.color == Color::Black))
        }

        if is_red(&self.root) {
            return Err("red root".to_string());
        }
        let mut count = 0;
        walk(&self.root, None, None, &mut count)?;
        if count != self.len {
            return Err(format!("len {} but {} nodes", self.len, count));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, Rng, SeedableRng};
    use std::collections::BTreeMap;

    #[test]
    fn test_insert_and_get() {
        let mut tree = RbTree::new();
        for key in [50, 20, 80, 10, 30, 70, 90, 25] {
            assert_eq!(tree.insert(key, key * 10), None);
            tree.check_invariants().unwrap();
        }
        assert_eq!(tree.len(), 8);
        assert_eq!(tree.get(&25), Some(&250));
        assert_eq!(tree.get(&26), None);
    }

    #[test]
    fn test_insert_existing_key_replaces_value() {
        let mut tree = RbTree::new();
        tree.insert(3, "old");
        assert_eq!(tree.insert(3, "new"), Some("old"));
        assert_eq!(tree.len(), 1);
        assert_eq!(tree.get(&3), Some(&"new"));
    }

    #[test]
    fn test_pop_extremes() {
        let mut tree = RbTree::new();
        for key in [1, 5, 3] {
            tree.insert(key, ());
        }
        assert_eq!(tree.pop_last().map(|(k, _)| k), Some(5));
        assert_eq!(tree.pop_last().map(|(k, _)| k), Some(3));
        assert_eq!(tree.pop_last().map(|(k, _)| k), Some(1));
        assert_eq!(tree.pop_last(), None);

        for key in [1, 5, 3] {
            tree.insert(key, ());
        }
        assert_eq!(tree.pop_first().map(|(k, _)| k), Some(1));
        tree.check_invariants().unwrap();
    }

    #[test]
    fn test_remove_absent_key_is_noop() {
        let mut tree = RbTree::new();
        for key in 0..16 {
            tree.insert(key * 2, key);
        }
        let before: Vec<_> = tree.iter().map(|(k, v)| (*k, *v)).collect();
        assert_eq!(tree.remove(&7), None);
        let after: Vec<_> = tree.iter().map(|(k, v)| (*k, *v)).collect();
        assert_eq!(before, after);
        assert_eq!(tree.len(), 16);
    }

    #[test]
    fn test_first_last_and_clear() {
        let mut tree = RbTree::new();
        assert_eq!(tree.first(), None);
        for key in [-4, 12, 0, 7] {
            tree.insert(key, key);
        }
        assert_eq!(tree.first(), Some((&-4, &-4)));
        assert_eq!(tree.last(), Some((&12, &12)));
        tree.clear();
        assert!(tree.is_empty());
        assert_eq!(tree.iter().count(), 0);
    }

    #[test]
    fn test_random_operations_keep_invariants() {
        let mut rng = StdRng::seed_from_u64(438);
        let mut tree = RbTree::new();
        let mut model = BTreeMap::new();

        for _ in 0..5_000 {
            let key: i32 = rng.random_range(-200..200);
            match rng.random_range(0..4) {
                0 | 1 => {
                    let value: u32 = rng.random();
                    assert_eq!(tree.insert(key, value), model.insert(key, value));
                }
                2 => assert_eq!(tree.remove(&key), model.remove(&key)),
                _ => {
                    if rng.random_bool(0.5) {
                        assert_eq!(tree.pop_first(), model.pop_first());
                    } else {
                        assert_eq!(tree.pop_last(), model.pop_last());
                    }
                }
            }
            tree.check_invariants().unwrap();
            assert_eq!(tree.len(), model.len());
        }

        let keys: Vec<_> = tree.iter().map(|(k, _)| *k).collect();
        assert!(keys.windows(2).all(|pair| pair[0] < pair[1]));
        assert_eq!(keys, model.keys().copied().collect::<Vec<_>>());
    }

    #[test]
    fn test_sequential_keys_stay_logarithmic() {
        let mut tree = RbTree::new();
        for key in 0..10_000 {
            tree.insert(key, ());
        }
        tree.check_invariants().unwrap();

        fn height<K, V>(link: &Link<K, V>) -> usize {
            link.as_ref().map_or(0, |node| 1 + height(&node.left).max(height(&node.right)))
        }
        // 2 * log2(10_001) is just under 28
        assert!(height(&tree.root) <= 28);

        while let Some((key, _)) = tree.pop_last() {
            if key % 1_000 == 0 {
                tree.check_invariants().unwrap();
            }
        }
        assert!(tree.is_empty());
    }
}
