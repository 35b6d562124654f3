use std::sync::atomic::{AtomicUsize, Ordering};

use log::{debug, error};

use crate::Backend;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EmptyBackendSet;

impl std::fmt::Display for EmptyBackendSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "backend set must contain at least one backend")
    }
}

impl std::error::Error for EmptyBackendSet {}

/// Outcome of a round-robin pick.
#[derive(Debug)]
pub enum Selection<'a, B> {
    Selected { index: usize, backend: &'a B },
    NoneAvailable,
}

impl<'a, B> Selection<'a, B> {
    pub fn backend(&self) -> Option<&'a B> {
        match self {
            Selection::Selected { backend, .. } => Some(*backend),
            Selection::NoneAvailable => None,
        }
    }
}

/// Fixed, ordered set of backends walked in round-robin order.
pub struct BackendSet<B> {
    backends: Vec<B>,
    cursor: AtomicUsize,
}

impl<B: Backend> BackendSet<B> {
    pub fn new(backends: Vec<B>) -> Result<Self, EmptyBackendSet> {
        if backends.is_empty() {
            return Err(EmptyBackendSet);
        }

        Ok(Self {
            backends,
            cursor: AtomicUsize::new(0),
        })
    }

    pub fn len(&self) -> usize {
        self.backends.len()
    }

    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&B> {
        self.backends.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &B> {
        self.backends.iter()
    }

    // Cursor stays in `[0, len)`, so it never wraps past `usize::MAX`.
    fn advance(&self, by: usize) -> usize {
        let len = self.backends.len();
        match self
            .cursor
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |cursor| {
                Some((cursor + by % len) % len)
            }) {
            Ok(previous) | Err(previous) => previous,
        }
    }

    /// Picks the next alive backend.
    ///
    /// The cursor moves by one for every backend skipped plus one for the
    /// backend returned. At most `len()` backends are inspected, so a set with
    /// nothing alive yields `NoneAvailable` instead of spinning.
    pub fn next(&self) -> Selection<'_, B> {
        let len = self.backends.len();
        let start = self.advance(1);

        for offset in 0..len {
            let index = (start + offset) % len;
            let backend = &self.backends[index];

            if !backend.is_alive() {
                debug!("Skipping backend {} (not alive)", backend.address());
                continue;
            }

            if offset > 0 {
                self.advance(offset);
            }
            return Selection::Selected { index, backend };
        }

        // the scan looked at every backend; account for the skips
        self.advance(len - 1);
        error!("No backend available");
        Selection::NoneAvailable
    }
}
