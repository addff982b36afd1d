//! Access-order log for the item cache
//!
//! Records queried positions in recency order: the front is the least
//! recently touched position, the back the most recent. Implemented as a
//! doubly linked list whose nodes live in a position-keyed map, so `touch`,
//! `push_back` and `remove` are all O(1).

use std::collections::HashMap;

#[derive(Debug, Clone, Copy)]
struct Node {
    prev: Option<usize>,
    next: Option<usize>,
}

#[derive(Debug, Default, Clone)]
pub struct AccessLog {
    nodes: HashMap<usize, Node>,
    head: Option<usize>,
    tail: Option<usize>,
}

impl AccessLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Least recently touched position.
    pub fn front(&self) -> Option<usize> {
        self.head
    }

    /// Append `key` as most recently used. A key already present is moved.
    pub fn push_back(&mut self, key: usize) {
        if self.nodes.contains_key(&key) {
            self.touch(key);
            return;
        }
        let node = Node {
            prev: self.tail,
            next: None,
        };
        if let Some(tail) = self.tail {
            if let Some(t) = self.nodes.get_mut(&tail) {
                t.next = Some(key);
            }
        } else {
            self.head = Some(key);
        }
        self.tail = Some(key);
        self.nodes.insert(key, node);
    }

    /// Move `key` to the most recently used end. Returns false if absent.
    pub fn touch(&mut self, key: usize) -> bool {
        if !self.nodes.contains_key(&key) {
            return false;
        }
        if self.tail == Some(key) {
            return true;
        }
        self.unlink(key);
        self.push_back(key);
        true
    }

    /// Remove `key`. Returns false if absent.
    pub fn remove(&mut self, key: usize) -> bool {
        if !self.nodes.contains_key(&key) {
            return false;
        }
        self.unlink(key);
        true
    }

    pub fn clear(&mut self) {
        self.nodes.clear();
        self.head = None;
        self.tail = None;
    }

    /// Positions from least to most recently used.
    pub fn iter(&self) -> AccessLogIter<'_> {
        AccessLogIter {
            log: self,
            cursor: self.head,
        }
    }

    fn unlink(&mut self, key: usize) {
        let Some(node) = self.nodes.remove(&key) else {
            return;
        };
        match node.prev {
            Some(prev) => {
                if let Some(p) = self.nodes.get_mut(&prev) {
                    p.next = node.next;
                }
            }
            None => self.head = node.next,
        }
        match node.next {
            Some(next) => {
                if let Some(n) = self.nodes.get_mut(&next) {
                    n.prev = node.prev;
                }
            }
            None => self.tail = node.prev,
        }
    }
}

pub struct AccessLogIter<'a> {
    log: &'a AccessLog,
    cursor: Option<usize>,
}

impl<'a> Iterator for AccessLogIter<'a> {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        let key = self.cursor?;
        self.cursor = self.log.nodes.get(&key).and_then(|n| n.next);
        Some(key)
    }
}
