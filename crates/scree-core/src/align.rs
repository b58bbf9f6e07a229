//! Batch alignment — stable partition by the batch-maximum payload length.
//!
//! UDP segmentation offload splits one oversized buffer into equal-size
//! datagrams and may shorten only the final one. A batch therefore coalesces
//! best when every packet of the largest length class sits in one contiguous
//! leading run. Alignment moves exactly those packets to the front, keeping
//! relative order on both sides of the partition.
//!
//! This is a heuristic, not an optimal packing: only the single largest
//! length class is grouped, and the remainder is left as-is.

use crate::packet::PacketRecord;

/// Result of aligning a batch, in the form the caller needs for stamping
/// segment sizes: the common length of the leading run and how far it extends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Alignment {
    /// The maximum payload length present in the batch. 0 if every slot
    /// is empty (or the batch itself is empty).
    pub max_len: u16,
    /// Number of leading records whose length equals `max_len`.
    /// Records `[0, run)` form the offload-eligible prefix.
    pub run: usize,
}

/// Reorder `records` in place so every record of the batch-maximum length
/// occupies a maximal contiguous leading run.
///
/// Two linear passes, O(1) extra space. Stable on both sides: records of the
/// maximum length keep their relative order, and so do all the others — a
/// matching record is only ever swapped forward into the already-scanned
/// prefix, so non-matching records never move past one another.
///
/// Pure and idempotent; aligning an already-aligned batch changes nothing.
pub fn align_by_length(records: &mut [PacketRecord]) -> Alignment {
    let mut max_len = 0u16;
    for record in records.iter() {
        if record.length > max_len {
            max_len = record.length;
        }
    }

    let mut run = 0usize;
    for i in 0..records.len() {
        if records[i].length == max_len {
            if i != run {
                records.swap(run, i);
            }
            run += 1;
        }
    }

    Alignment { max_len, run }
}
