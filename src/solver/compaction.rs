//! Generic count→scan→scatter stream compaction.
//!
//! Contract, expand, fill-gaps and the band delete pass all share this
//! shape: a parallel predicate writes per-element emit counts, an
//! exclusive scan turns counts into scatter offsets, and a scatter pass
//! writes survivors (plus any emitted copies) densely into fresh storage.

use crate::scan::{PrefixScan, ScanWorkspace};

pub struct CompactionPass {
    scan: PrefixScan,
    ws: ScanWorkspace,
    counts: Vec<u32>,
    offsets: Vec<u32>,
}

impl Default for CompactionPass {
    fn default() -> Self {
        Self::new()
    }
}

impl CompactionPass {
    pub fn new() -> Self {
        Self {
            scan: PrefixScan::default(),
            ws: ScanWorkspace::new(),
            counts: Vec::new(),
            offsets: Vec::new(),
        }
    }

    /// Zeroed per-element emit counts, ready for the predicate pass.
    pub fn counts_mut(&mut self, n: usize) -> &mut [u32] {
        self.counts.clear();
        self.counts.resize(n, 0);
        &mut self.counts
    }

    pub fn counts(&self) -> &[u32] {
        &self.counts
    }

    /// Exclusive-scans the counts into the offsets buffer; returns the
    /// total number of emitted elements.
    pub fn scan(&mut self) -> usize {
        self.offsets.clear();
        self.offsets.extend_from_slice(&self.counts);
        self.scan.scan(&mut self.ws, &mut self.offsets) as usize
    }

    pub fn offsets(&self) -> &[u32] {
        &self.offsets
    }

    /// Scatters elements with a nonzero count into a dense vector, in
    /// order. Only valid for 0/1 counts; multi-emit sites scatter through
    /// `offsets()` themselves.
    pub fn compact<T: Copy>(&self, src: &[T]) -> Vec<T> {
        debug_assert_eq!(src.len(), self.counts.len());
        let total = self
            .counts
            .iter()
            .map(|&c| c as usize)
            .sum::<usize>();
        let mut out = Vec::with_capacity(total);
        for (i, &c) in self.counts.iter().enumerate() {
            if c > 0 {
                debug_assert_eq!(out.len(), self.offsets[i] as usize);
                out.push(src[i]);
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offsets_are_exclusive_sums() {
        let mut pass = CompactionPass::new();
        let counts = pass.counts_mut(6);
        counts.copy_from_slice(&[1, 0, 2, 1, 0, 1]);
        let total = pass.scan();

        assert_eq!(total, 5);
        assert_eq!(pass.offsets(), &[0, 1, 1, 3, 4, 4]);
    }

    #[test]
    fn compact_keeps_payloads_in_order() {
        let src = [10u32, 11, 12, 13, 14];
        let mut pass = CompactionPass::new();
        let counts = pass.counts_mut(src.len());
        counts.copy_from_slice(&[1, 0, 1, 0, 1]);
        pass.scan();

        assert_eq!(pass.compact(&src), vec![10, 12, 14]);
    }
}
