//! Bounded de-duplication windows

use super::types::DedupScope;
use std::collections::{HashMap, VecDeque};
use uuid::Uuid;

/// FIFO of the last `capacity` event ids
#[derive(Debug)]
pub struct DedupWindow {
    ids: VecDeque<Uuid>,
    capacity: usize,
}

impl DedupWindow {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            ids: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn contains(&self, id: &Uuid) -> bool {
        self.ids.contains(id)
    }

    /// Record `id`; false if it was already inside the window
    pub fn insert(&mut self, id: Uuid) -> bool {
        if self.contains(&id) {
            return false;
        }
        if self.ids.len() >= self.capacity {
            self.ids.pop_front();
        }
        self.ids.push_back(id);
        true
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// Windows according to the configured scope
#[derive(Debug)]
pub enum DedupTracker {
    Global(DedupWindow),
    PerCamera {
        capacity: usize,
        windows: HashMap<String, DedupWindow>,
    },
}

impl DedupTracker {
    pub fn new(scope: DedupScope, capacity: usize) -> Self {
        match scope {
            DedupScope::Global => DedupTracker::Global(DedupWindow::new(capacity)),
            DedupScope::PerCamera => DedupTracker::PerCamera {
                capacity,
                windows: HashMap::new(),
            },
        }
    }

    /// Record an event id; false if it is a duplicate
    pub fn check_and_record(&mut self, camera_id: &str, id: Uuid) -> bool {
        match self {
            DedupTracker::Global(window) => window.insert(id),
            DedupTracker::PerCamera { capacity, windows } => windows
                .entry(camera_id.to_string())
                .or_insert_with(|| DedupWindow::new(*capacity))
                .insert(id),
        }
    }

    pub fn forget_camera(&mut self, camera_id: &str) {
        if let DedupTracker::PerCamera { windows, .. } = self {
            windows.remove(camera_id);
        }
    }
}
