//! Parallel prefix sum (scan) used by every stream-compaction pass.

use rayon::prelude::*;

/// Exclusive parallel prefix sum over `u32` arrays.
///
/// The result is equivalent to a sequential scan with a 0 prepended to the
/// input; the discarded last partial sum is returned as the total. Every
/// compaction operator (contract, expand, fill-gaps, band add/delete) turns
/// per-element 0/1 counts into scatter offsets through this scan, so the
/// sums must be exact.
pub struct PrefixScan {
    batch_size: usize,
}

impl Default for PrefixScan {
    fn default() -> Self {
        Self::new(Self::BATCH)
    }
}

impl PrefixScan {
    const BATCH: usize = 4096;

    pub fn new(batch_size: usize) -> Self {
        assert!(batch_size > 0, "scan batch size must be positive");
        Self { batch_size }
    }

    /// Scans `data` in place and returns the total sum.
    ///
    /// Three stages, mirroring the multi-stage device scan:
    /// 1. each batch is scanned locally, its sum recorded in a carry array;
    /// 2. the small carry array is scanned;
    /// 3. carries are broadcast-added back onto their batches.
    pub fn scan(&self, workspace: &mut ScanWorkspace, data: &mut [u32]) -> u32 {
        if data.is_empty() {
            return 0;
        }

        workspace.reserve(data.len().div_ceil(self.batch_size));
        let carries = &mut workspace.carries;

        data.par_chunks_mut(self.batch_size)
            .zip(carries.par_iter_mut())
            .for_each(|(chunk, carry)| {
                *carry = Self::scan_batch(chunk);
            });

        // The carry array has one entry per batch; it is small enough that
        // a sequential scan is the whole second stage.
        let total = Self::scan_batch(carries);

        data.par_chunks_mut(self.batch_size)
            .zip(carries.par_iter())
            .for_each(|(chunk, carry)| {
                for v in chunk {
                    *v += *carry;
                }
            });

        total
    }

    /// Exclusive scan of one batch; returns the batch total.
    fn scan_batch(chunk: &mut [u32]) -> u32 {
        let mut acc = 0u32;
        for v in chunk.iter_mut() {
            let next = acc + *v;
            *v = acc;
            acc = next;
        }
        acc
    }

    /// Sequential reference scan used by the tests.
    pub fn eval_reference(v: &mut [u32]) -> u32 {
        let mut acc = 0u32;
        for x in v.iter_mut() {
            let next = acc + *x;
            *x = acc;
            acc = next;
        }
        acc
    }
}

/// Reusable carry buffer for the multi-stage scan.
#[derive(Default)]
pub struct ScanWorkspace {
    carries: Vec<u32>,
}

impl ScanWorkspace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(scan: &PrefixScan, data_len: usize) -> Self {
        let mut ws = Self::default();
        ws.reserve(data_len.div_ceil(scan.batch_size));
        ws
    }

    fn reserve(&mut self, num_batches: usize) {
        self.carries.clear();
        self.carries.resize(num_batches, 0);
    }
}
