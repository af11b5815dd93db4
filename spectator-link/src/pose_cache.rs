//! Bounded history of recent poses

use crate::protocol::PoseSample;
use std::collections::VecDeque;

/// A pose with its timestamp already converted to seconds
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CachedPose {
    pub sample: PoseSample,
    pub time_seconds: f64,
}

impl CachedPose {
    /// Origin, identity rotation, time zero
    pub const NEUTRAL: CachedPose = CachedPose {
        sample: PoseSample::NEUTRAL,
        time_seconds: 0.0,
    };

    pub fn position(&self) -> [f32; 3] {
        self.sample.position
    }

    pub fn rotation(&self) -> [f32; 4] {
        self.sample.rotation
    }
}

impl Default for CachedPose {
    fn default() -> Self {
        Self::NEUTRAL
    }
}

/// Ring of the most recent poses, newest at the back
#[derive(Debug, Clone)]
pub struct PoseCache {
    entries: VecDeque<CachedPose>,
    capacity: usize,
}

impl PoseCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Insert a pose, evicting the oldest past capacity
    pub fn push(&mut self, pose: CachedPose) {
        if self.capacity == 0 {
            return;
        }
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(pose);
    }

    /// Pose `frames_ago` insertions behind the newest (0 = newest)
    ///
    /// Returns the neutral pose when the cache is empty or the offset
    /// reaches past the retained history.
    pub fn get(&self, frames_ago: usize) -> CachedPose {
        let len = self.entries.len();
        if frames_ago >= len {
            return CachedPose::NEUTRAL;
        }
        self.entries[len - 1 - frames_ago]
    }

    pub fn latest(&self) -> Option<CachedPose> {
        self.entries.back().copied()
    }

    /// Drop all history
    pub fn reset(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
