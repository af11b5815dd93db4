//! Mesh-set reassembly from spatial mapping fragments
//!
//! Fragments place their payload at a host-supplied offset in one buffer
//! sized to the declared mesh-set length. The set is complete when the
//! declared number of fragments has arrived *and* the written ranges cover
//! the whole buffer. Counting alone would accept a duplicated fragment in
//! place of a missing one.

use crate::error::{Error, Result};
use crate::protocol::SpatialMappingFragment;
use std::collections::BTreeMap;

/// Sorted, merged set of written byte ranges
#[derive(Debug, Default, Clone)]
pub struct Coverage {
    /// start -> end (exclusive), never overlapping or touching
    ranges: BTreeMap<usize, usize>,
}

impl Coverage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `[start, end)`; returns true if it overlapped bytes already written
    pub fn insert(&mut self, start: usize, end: usize) -> bool {
        if start >= end {
            return false;
        }

        let mut new_start = start;
        let mut new_end = end;
        let mut overlapped = false;

        // Absorb the range that begins at or before `start` if it reaches us
        if let Some((&s, &e)) = self.ranges.range(..=start).next_back()
            && e >= start
        {
            overlapped |= e > start;
            new_start = s;
            new_end = new_end.max(e);
            self.ranges.remove(&s);
        }

        // Absorb every range that begins inside the new span
        let following: Vec<(usize, usize)> = self
            .ranges
            .range(new_start..=new_end)
            .map(|(&s, &e)| (s, e))
            .collect();
        for (s, e) in following {
            overlapped |= s < end;
            new_end = new_end.max(e);
            self.ranges.remove(&s);
        }

        self.ranges.insert(new_start, new_end);
        overlapped
    }

    /// Total bytes written at least once
    pub fn covered(&self) -> usize {
        self.ranges.iter().map(|(s, e)| e - s).sum()
    }

    /// True if `[0, total)` is fully written
    pub fn is_complete(&self, total: usize) -> bool {
        if total == 0 {
            return true;
        }
        self.ranges.len() == 1 && self.ranges.get(&0) == Some(&total)
    }

    #[cfg(test)]
    fn range_count(&self) -> usize {
        self.ranges.len()
    }
}

/// Mesh set currently being filled
struct InFlightSet {
    bytes: Vec<u8>,
    fragment_count: usize,
    received: usize,
    coverage: Coverage,
    overlapping_writes: usize,
}

/// Snapshot of reassembly state for diagnostics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReassemblyProgress {
    pub received: usize,
    pub expected: usize,
    pub covered_bytes: usize,
    pub total_bytes: usize,
}

/// Rebuilds mesh-set buffers from fragments
///
/// Owns at most one in-progress buffer. Any error discards it; the caller
/// treats the error as a desynchronized stream.
pub struct MeshAssembler {
    max_mesh_set_bytes: usize,
    in_flight: Option<InFlightSet>,
}

impl MeshAssembler {
    pub fn new(max_mesh_set_bytes: usize) -> Self {
        Self {
            max_mesh_set_bytes,
            in_flight: None,
        }
    }

    /// Place one fragment
    ///
    /// Returns the complete mesh-set buffer once the set is done, after
    /// which the assembler is ready for the next set.
    pub fn accept(&mut self, fragment: SpatialMappingFragment) -> Result<Option<Vec<u8>>> {
        let mut set = match self.in_flight.take() {
            Some(set) => set,
            None => self.begin(&fragment)?,
        };

        let total = set.bytes.len();
        if fragment.total_bytes != total || fragment.fragment_count != set.fragment_count {
            return Err(Error::InconsistentFragment(format!(
                "fragment declares {} bytes in {} fragments, set in flight has {} bytes in {}",
                fragment.total_bytes, fragment.fragment_count, total, set.fragment_count
            )));
        }

        let start = fragment.start_index;
        let end = fragment.end_index();
        if end > total {
            return Err(Error::FragmentOutOfBounds { start, end, total });
        }

        set.bytes[start..end].copy_from_slice(&fragment.payload);
        if set.coverage.insert(start, end) {
            set.overlapping_writes += 1;
            log::debug!("Fragment [{}, {}) overwrote earlier data", start, end);
        }
        set.received += 1;

        if set.received < set.fragment_count {
            self.in_flight = Some(set);
            return Ok(None);
        }

        if !set.coverage.is_complete(total) {
            return Err(Error::IncompleteMeshSet {
                received: set.received,
                missing: total - set.coverage.covered(),
            });
        }

        if set.overlapping_writes > 0 {
            log::warn!(
                "Mesh set completed with {} overlapping fragment writes",
                set.overlapping_writes
            );
        }
        log::debug!(
            "Mesh set complete: {} bytes from {} fragments",
            total,
            set.received
        );
        Ok(Some(set.bytes))
    }

    fn begin(&self, fragment: &SpatialMappingFragment) -> Result<InFlightSet> {
        if fragment.total_bytes > self.max_mesh_set_bytes {
            return Err(Error::MeshSetTooLarge {
                declared: fragment.total_bytes,
                limit: self.max_mesh_set_bytes,
            });
        }

        log::debug!(
            "New mesh set: {} bytes in {} fragments",
            fragment.total_bytes,
            fragment.fragment_count
        );

        Ok(InFlightSet {
            bytes: vec![0u8; fragment.total_bytes],
            fragment_count: fragment.fragment_count,
            received: 0,
            coverage: Coverage::new(),
            overlapping_writes: 0,
        })
    }

    /// Drop any partially filled mesh set
    pub fn discard(&mut self) {
        if let Some(set) = self.in_flight.take() {
            log::info!(
                "Discarding partial mesh set ({}/{} fragments)",
                set.received,
                set.fragment_count
            );
        }
    }

    pub fn is_idle(&self) -> bool {
        self.in_flight.is_none()
    }

    pub fn progress(&self) -> Option<ReassemblyProgress> {
        self.in_flight.as_ref().map(|set| ReassemblyProgress {
            received: set.received,
            expected: set.fragment_count,
            covered_bytes: set.coverage.covered(),
            total_bytes: set.bytes.len(),
        })
    }
}
