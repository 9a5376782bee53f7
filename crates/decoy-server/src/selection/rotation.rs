//! Rotation cursors for sequential response selection.

use parking_lot::{RwLock, RwLockWriteGuard};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// A monotonically increasing cursor; the selected index is `cursor % count`.
#[derive(Default)]
pub struct RotationCursor(AtomicU64);

impl RotationCursor {
    #[must_use]
    pub const fn new() -> Self {
        Self(AtomicU64::new(0))
    }

    /// Take the next slot and map it onto `count` candidates.
    #[must_use]
    pub fn next_index(&self, count: usize) -> usize {
        let ticket = self.0.fetch_add(1, Ordering::Relaxed);
        (ticket % count.max(1) as u64) as usize
    }

    #[must_use]
    pub fn peek_index(&self, count: usize) -> usize {
        (self.0.load(Ordering::Relaxed) % count.max(1) as u64) as usize
    }

    pub fn reset(&self) {
        self.0.store(0, Ordering::Relaxed);
    }
}

impl fmt::Debug for RotationCursor {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_tuple("RotationCursor")
            .field(&self.0.load(Ordering::Relaxed))
            .finish()
    }
}

/// Identifies the cursor of one endpoint within one project.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RotationKey {
    pub project_id: String,
    pub endpoint_id: String,
}

impl fmt::Display for RotationKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}/{}", self.project_id, self.endpoint_id)
    }
}

/// Build the store key for an endpoint.
pub fn rotation_key(project_id: &str, endpoint_id: &str) -> RotationKey {
    RotationKey {
        project_id: project_id.to_string(),
        endpoint_id: endpoint_id.to_string(),
    }
}

/// Per-endpoint rotation cursors shared by all requests.
///
/// All cursors live behind one lock; the lock is only taken for writing when
/// a cursor is first created or when cursors are removed.
#[derive(Default)]
pub struct RotationStore {
    cursors: RwLock<HashMap<RotationKey, RotationCursor>>,
}

impl RotationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Advance the cursor for `key` and return the index to use.
    pub fn next_index(&self, key: &RotationKey, count: usize) -> usize {
        if count == 0 {
            return 0;
        }

        let mut cursors = self.cursors.read();
        // Read lock first; if the cursor is missing, insert it and downgrade.
        if !cursors.contains_key(key) {
            drop(cursors);
            let mut write = self.cursors.write();
            write.entry(key.clone()).or_default();
            cursors = RwLockWriteGuard::downgrade(write);
        }
        cursors.get(key).map_or(0, |cursor| cursor.next_index(count))
    }

    /// Peek at the index the next request would get.
    pub fn peek_index(&self, key: &RotationKey, count: usize) -> usize {
        self.cursors
            .read()
            .get(key)
            .map_or(0, |cursor| cursor.peek_index(count))
    }

    pub fn reset(&self, key: &RotationKey) {
        if let Some(cursor) = self.cursors.read().get(key) {
            cursor.reset();
        }
    }

    /// Drop every cursor belonging to a project.
    pub fn reset_project(&self, project_id: &str) {
        self.cursors
            .write()
            .retain(|key, _| key.project_id != project_id);
    }

    pub fn reset_all(&self) {
        self.cursors.write().clear();
    }

    pub fn len(&self) -> usize {
        self.cursors.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.cursors.read().is_empty()
    }
}

impl fmt::Debug for RotationStore {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("RotationStore")
            .field("cursors", &self.len())
            .finish()
    }
}
