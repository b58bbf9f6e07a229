//! The batch transmission context: one allocation pass, many send batches.
//!
//! A context owns five parallel arrays of identical length `count`: the
//! buffer pool (one arena, sliced per slot), the scatter descriptors, the
//! offload control blocks, the message headers, and the packet records.
//! Wiring is fixed at construction — header `i` always points at descriptor
//! `i` and control block `i`, and descriptor `i` always points at pool slot
//! `i`. Between sends only lengths, segment sizes, and the record array
//! change; nothing is ever re-pointed.
//!
//! A context is single-threaded by design: one per worker or output stream,
//! reused across batches, released on drop.

use std::fmt;
use std::io;
use std::mem;
use std::os::fd::{AsRawFd, BorrowedFd};
use std::ptr;

use scree_core::{align_by_length, Alignment, PacketRecord, MTU};

use crate::cmsg::{SegmentControl, SEGMENT_CMSG_SPACE};

/// Errors from context construction and staging.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BatchError {
    #[error("batch capacity must be at least 1")]
    InvalidCapacity,

    #[error("failed to allocate {bytes} bytes for the {what}")]
    Allocation { what: &'static str, bytes: usize },

    #[error("slot {slot} out of range for capacity {capacity}")]
    SlotOutOfRange { slot: usize, capacity: usize },

    #[error("payload of {0} bytes exceeds the slot size {}", MTU)]
    PayloadTooLarge(usize),
}

/// Allocate a boxed slice without aborting on out-of-memory.
fn try_boxed<T: Clone>(len: usize, fill: T, what: &'static str) -> Result<Box<[T]>, BatchError> {
    let mut v: Vec<T> = Vec::new();
    v.try_reserve_exact(len).map_err(|_| BatchError::Allocation {
        what,
        bytes: len * mem::size_of::<T>(),
    })?;
    v.resize(len, fill);
    Ok(v.into_boxed_slice())
}

/// A reusable context for handing up to `count` packets to the kernel in a
/// single `sendmmsg` call, with segmentation offload requested per message.
pub struct BatchContext {
    /// `MTU × count` bytes; slot `i` is `[i·MTU, (i+1)·MTU)`. Never aliased
    /// outside this context.
    pool: Box<[u8]>,
    /// Descriptor `i` points at pool slot `i`; only `iov_len` changes.
    iovecs: Box<[libc::iovec]>,
    /// Pre-stamped offload directives; only the segment size changes.
    controls: Box<[SegmentControl]>,
    /// Header `i` binds descriptor `i` and control block `i`, permanently.
    headers: Box<[libc::mmsghdr]>,
    /// The reorderable per-packet metadata. Record order is the batch order;
    /// `record.slot` names the pool region holding its bytes.
    records: Box<[PacketRecord]>,
    count: usize,
}

// SAFETY: the raw pointers inside `iovecs` and `headers` only reference heap
// allocations owned by this same value, so sending the context to another
// thread transfers exclusive access to everything they point at. Boxed slices
// never reallocate, and moving the context moves only the box headers — the
// pointed-at storage stays put.
unsafe impl Send for BatchContext {}

impl BatchContext {
    /// Allocate and wire a context for up to `count` packets.
    ///
    /// All-or-nothing: a zero capacity or any allocation failure returns an
    /// error and leaves nothing half-initialized. Performs no I/O.
    pub fn new(count: usize) -> Result<Self, BatchError> {
        if count == 0 {
            return Err(BatchError::InvalidCapacity);
        }

        let pool = try_boxed(MTU * count, 0u8, "buffer pool")?;
        let empty_iovec = libc::iovec {
            iov_base: ptr::null_mut(),
            iov_len: 0,
        };
        let iovecs = try_boxed(count, empty_iovec, "scatter descriptors")?;
        let controls = try_boxed(count, SegmentControl::zeroed(), "control blocks")?;
        // SAFETY: mmsghdr is a plain C struct for which all-zeroes is valid.
        let empty_header: libc::mmsghdr = unsafe { mem::zeroed() };
        let headers = try_boxed(count, empty_header, "message headers")?;
        let records = try_boxed(count, PacketRecord::default(), "packet records")?;

        let mut ctx = Self {
            pool,
            iovecs,
            controls,
            headers,
            records,
            count,
        };
        ctx.wire();

        tracing::trace!(count, pool_bytes = MTU * count, "batch context created");
        Ok(ctx)
    }

    /// Bind descriptor `i` to pool slot `i`, stamp control block `i`, and
    /// bind header `i` to both. Runs once; the bindings outlive every batch.
    fn wire(&mut self) {
        let pool_base = self.pool.as_mut_ptr();
        let iovec_base = self.iovecs.as_mut_ptr();

        for i in 0..self.count {
            // SAFETY: i < count, so i·MTU stays inside the pool allocation
            // and iovec_base.add(i) stays inside the descriptor array.
            unsafe {
                let iov = iovec_base.add(i);
                (*iov).iov_base = pool_base.add(i * MTU) as *mut libc::c_void;
                (*iov).iov_len = 0;
            }

            self.controls[i].stamp();
            let control_ptr = self.controls[i].as_mut_ptr();

            let hdr = &mut self.headers[i].msg_hdr;
            // SAFETY: the pointer stays valid — boxed slices never move their
            // storage, and the descriptor array lives exactly as long as the
            // header array.
            hdr.msg_iov = unsafe { iovec_base.add(i) };
            hdr.msg_iovlen = 1;
            hdr.msg_control = control_ptr;
            hdr.msg_controllen = SEGMENT_CMSG_SPACE as _;
            hdr.msg_flags = 0;
        }
    }

    /// Fixed capacity chosen at construction.
    pub fn capacity(&self) -> usize {
        self.count
    }

    /// The packet records, in current batch order.
    pub fn records(&self) -> &[PacketRecord] {
        &self.records
    }

    /// Mutable access for upstream packetization that fills records in place.
    pub fn records_mut(&mut self) -> &mut [PacketRecord] {
        &mut self.records
    }

    /// The full `MTU`-byte pool region for `slot`, for packetizers that
    /// write payload bytes directly.
    pub fn slot_bytes_mut(&mut self, slot: usize) -> Result<&mut [u8], BatchError> {
        if slot >= self.count {
            return Err(BatchError::SlotOutOfRange {
                slot,
                capacity: self.count,
            });
        }
        Ok(&mut self.pool[slot * MTU..(slot + 1) * MTU])
    }

    /// Copy `payload` into pool slot `slot` and rebind the record at the same
    /// position to describe it, returning the record for metadata fill-in.
    ///
    /// Staging position `i` always uses pool slot `i`; any ordering left over
    /// from a previous batch's alignment is overwritten, never cleared.
    pub fn stage(&mut self, slot: usize, payload: &[u8]) -> Result<&mut PacketRecord, BatchError> {
        if slot >= self.count {
            return Err(BatchError::SlotOutOfRange {
                slot,
                capacity: self.count,
            });
        }
        if payload.len() > MTU {
            return Err(BatchError::PayloadTooLarge(payload.len()));
        }

        self.pool[slot * MTU..slot * MTU + payload.len()].copy_from_slice(payload);

        let record = &mut self.records[slot];
        record.reset();
        record.length = payload.len() as u16;
        record.slot = slot;
        Ok(record)
    }

    /// Reorder the record array so the batch-maximum length forms a maximal
    /// leading run. Only records move; every kernel-facing binding stays put.
    ///
    /// The returned [`Alignment`] is what the caller needs to stamp segment
    /// sizes before submission.
    pub fn align(&mut self) -> Alignment {
        align_by_length(&mut self.records)
    }

    /// Write `size` into control block `slot`'s segment-size field.
    pub fn set_segment_size(&mut self, slot: usize, size: u16) -> Result<(), BatchError> {
        if slot >= self.count {
            return Err(BatchError::SlotOutOfRange {
                slot,
                capacity: self.count,
            });
        }
        self.controls[slot].set_segment_size(size);
        Ok(())
    }

    /// Read back control block `slot`'s segment-size field.
    pub fn segment_size(&self, slot: usize) -> Result<u16, BatchError> {
        if slot >= self.count {
            return Err(BatchError::SlotOutOfRange {
                slot,
                capacity: self.count,
            });
        }
        Ok(self.controls[slot].segment_size())
    }

    /// Stamp the aligned leading run: every record in `[0, run)` gets its
    /// control block set to the run's common length. Control blocks of
    /// records past the run are cleared to 0 (offload disabled) — a reused
    /// context would otherwise submit them with the previous batch's segment
    /// size still stamped, splitting packets on the wire.
    pub fn stamp_segment_sizes(&mut self, alignment: Alignment) {
        for (position, record) in self.records.iter().enumerate() {
            let size = if position < alignment.run {
                alignment.max_len
            } else {
                0
            };
            // An out-of-range slot (possible via records_mut) is submit's
            // error to report; skip it here.
            if let Some(control) = self.controls.get_mut(record.slot) {
                control.set_segment_size(size);
            }
        }
    }

    /// Submit a batch occupying slots `[0, n)` in one `sendmmsg` call.
    ///
    /// `n` is the number of slots the caller staged for this batch; each goes
    /// out as one message. Descriptor lengths are refreshed from the records,
    /// bindings are not touched, and record order (aligned or not) does not
    /// affect which slots are sent. The socket must be a connected datagram
    /// socket — headers carry no destination address — and stays owned by the
    /// caller. Returns how many messages the kernel accepted, which may be
    /// fewer than `n` (partial success).
    pub fn submit(&mut self, fd: BorrowedFd<'_>, n: usize) -> io::Result<usize> {
        if n > self.count {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "batch length exceeds context capacity",
            ));
        }
        if n == 0 {
            return Ok(0);
        }

        for record in self.records.iter().take(n) {
            debug_assert!(record.length as usize <= MTU);
            // Records are writable through records_mut, so a bad slot index
            // must surface as an error rather than an indexing panic.
            let iov = self.iovecs.get_mut(record.slot).ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::InvalidInput,
                    BatchError::SlotOutOfRange {
                        slot: record.slot,
                        capacity: self.count,
                    },
                )
            })?;
            iov.iov_len = record.length as usize;
        }

        // SAFETY: fd is a live socket borrowed from the caller; the first n
        // headers are fully wired to descriptors, control blocks, and pool
        // slots owned by self.
        let sent = unsafe { libc::sendmmsg(fd.as_raw_fd(), self.headers.as_mut_ptr(), n as u32, 0) };
        if sent < 0 {
            return Err(io::Error::last_os_error());
        }

        tracing::trace!(requested = n, sent, "batch submitted");
        Ok(sent as usize)
    }
}

impl fmt::Debug for BatchContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchContext")
            .field("count", &self.count)
            .field("records", &self.records)
            .finish_non_exhaustive()
    }
}

impl Drop for BatchContext {
    fn drop(&mut self) {
        tracing::trace!(count = self.count, "batch context released");
    }
}
