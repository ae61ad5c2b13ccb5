/// Priority queue behind request admission.
///
/// Smaller priorities pop first; equal priorities pop in insertion order, so
/// the outcome never depends on allocation or hashing. An optional maximum
/// length gives callers backpressure. Items that stop mattering are removed
/// with [`WorkQueue::retain`] rather than through handles.
///
/// Vec-backed: it holds at most a few hundred tile requests.

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct WorkQueueFull {
    pub max_len: usize,
}

#[derive(Debug)]
struct Item<T> {
    // (priority, insertion sequence); the sequence breaks ties.
    key: (i64, u64),
    payload: T,
}

#[derive(Debug)]
pub struct WorkQueue<T> {
    sequence: u64,
    items: Vec<Item<T>>,
    max_len: Option<usize>,
}

impl<T> Default for WorkQueue<T> {
    fn default() -> Self {
        Self {
            sequence: 0,
            items: Vec::new(),
            max_len: None,
        }
    }
}

impl<T> WorkQueue<T> {
    pub fn with_max_len(max_len: usize) -> Self {
        Self {
            max_len: Some(max_len),
            ..Self::default()
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn push(&mut self, priority: i64, payload: T) {
        let key = (priority, self.sequence);
        self.sequence = self.sequence.wrapping_add(1);
        self.items.push(Item { key, payload });
    }

    pub fn try_push(&mut self, priority: i64, payload: T) -> Result<(), WorkQueueFull> {
        match self.max_len {
            Some(max_len) if self.items.len() >= max_len => Err(WorkQueueFull { max_len }),
            _ => {
                self.push(priority, payload);
                Ok(())
            }
        }
    }

    /// Drops every item for which `keep` returns `false`. Order of the
    /// remaining items is unchanged.
    pub fn retain(&mut self, mut keep: impl FnMut(&T) -> bool) {
        self.items.retain(|item| keep(&item.payload));
    }

    /// Pops the item with the smallest priority, oldest first among equals.
    pub fn pop_next(&mut self) -> Option<(i64, T)> {
        let idx = self
            .items
            .iter()
            .enumerate()
            .min_by_key(|(_, item)| item.key)
            .map(|(idx, _)| idx)?;
        let item = self.items.swap_remove(idx);
        Some((item.key.0, item.payload))
    }
}
