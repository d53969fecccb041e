use std::collections::HashMap;

use crate::key::{Key, Value};

/// In-memory overlay over the trie: a stack of levels, each checkpointable and
/// revertible independently. `get` is O(1) via `key_revisions`, a per-key stack of
/// the level indices that hold a revision of that key — its top always points at the
/// level carrying the most recent write.
pub struct StackedMap {
    levels: Vec<HashMap<Key, Value>>,
    journals: Vec<Vec<(Key, Value)>>,
    key_revisions: HashMap<Key, Vec<usize>>,
}

impl Default for StackedMap {
    fn default() -> Self {
        Self {
            levels: vec![HashMap::new()],
            journals: vec![Vec::new()],
            key_revisions: HashMap::new(),
        }
    }
}

impl StackedMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current stack depth (the base level counts as depth 1).
    pub fn depth(&self) -> usize {
        self.levels.len()
    }

    /// Begins a new level; returns the pre-push depth, usable as a checkpoint handle
    /// for `pop_to`.
    pub fn push(&mut self) -> usize {
        let depth = self.levels.len();
        self.levels.push(HashMap::new());
        self.journals.push(Vec::new());
        depth
    }

    /// Discards the top level and unwinds every key it touched back to its prior
    /// revision (or removes the key entirely if this was its only revision).
    pub fn pop(&mut self) {
        let level_idx = self.levels.len().saturating_sub(1);
        let Some(level) = self.levels.pop() else {
            return;
        };
        self.journals.pop();
        for key in level.keys() {
            if let Some(stack) = self.key_revisions.get_mut(key) {
                stack.retain(|&idx| idx != level_idx);
                if stack.is_empty() {
                    self.key_revisions.remove(key);
                }
            }
        }
    }

    /// Repeated `pop` until the stack depth equals `depth`. A no-op if already there
    /// or shallower.
    pub fn pop_to(&mut self, depth: usize) {
        while self.levels.len() > depth.max(1) {
            self.pop();
        }
    }

    /// Returns the most recent revision of `key`, if any level holds one.
    pub fn get(&self, key: &Key) -> Option<&Value> {
        let level_idx = *self.key_revisions.get(key)?.last()?;
        self.levels[level_idx].get(key)
    }

    /// Writes `value` into the top level and appends a journal entry. Pushes the
    /// current level index onto the key's revision stack only if it isn't already
    /// the top, so repeated writes within one level don't grow the stack.
    pub fn put(&mut self, key: Key, value: Value) {
        let top = self.levels.len() - 1;
        self.journals[top].push((key.clone(), value.clone()));
        self.levels[top].insert(key.clone(), value);
        let stack = self.key_revisions.entry(key).or_default();
        if stack.last() != Some(&top) {
            stack.push(top);
        }
    }

    /// Iterates every journal entry from the bottom level to the top, in the order
    /// writes happened. `cb` returns `false` to stop early.
    pub fn journal<F: FnMut(&Key, &Value) -> bool>(&self, mut cb: F) {
        for level_journal in &self.journals {
            for (key, value) in level_journal {
                if !cb(key, value) {
                    return;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ethereum_types::Address;
    use thor_common::Account;

    fn acc(balance: u64) -> Value {
        Value::Account(Account {
            balance: balance.into(),
            ..Default::default()
        })
    }

    #[test]
    fn put_then_get_round_trips_at_the_base_level() {
        let mut map = StackedMap::new();
        let key = Key::Account(Address::repeat_byte(1));
        map.put(key.clone(), acc(10));
        match map.get(&key) {
            Some(Value::Account(account)) => assert_eq!(account.balance, 10u64.into()),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn pop_reverts_writes_made_after_the_checkpoint() {
        let mut map = StackedMap::new();
        let key = Key::Account(Address::repeat_byte(1));
        map.put(key.clone(), acc(10));
        let checkpoint = map.push();
        map.put(key.clone(), acc(20));
        assert!(matches!(map.get(&key), Some(Value::Account(a)) if a.balance == 20u64.into()));
        map.pop_to(checkpoint);
        assert!(matches!(map.get(&key), Some(Value::Account(a)) if a.balance == 10u64.into()));
    }

    #[test]
    fn pop_removes_a_key_with_no_earlier_revision() {
        let mut map = StackedMap::new();
        let key = Key::Account(Address::repeat_byte(2));
        let checkpoint = map.push();
        map.put(key.clone(), acc(5));
        assert!(map.get(&key).is_some());
        map.pop_to(checkpoint);
        assert!(map.get(&key).is_none());
    }

    #[test]
    fn journal_replays_writes_in_insertion_order() {
        let mut map = StackedMap::new();
        let a = Key::Account(Address::repeat_byte(1));
        let b = Key::Account(Address::repeat_byte(2));
        map.put(a.clone(), acc(1));
        map.push();
        map.put(b.clone(), acc(2));
        map.put(a.clone(), acc(3));

        let mut seen = Vec::new();
        map.journal(|key, _value| {
            seen.push(key.clone());
            true
        });
        assert_eq!(seen, vec![a.clone(), b, a]);
    }
}
