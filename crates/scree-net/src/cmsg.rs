//! Segmentation-offload control block — exact kernel ancillary-data layout.
//!
//! Every message header in a batch context carries one of these blocks. The
//! level, type, and ancillary length are stamped once at construction; only
//! the 16-bit segment-size value changes between sends. The CMSG_ALIGN /
//! CMSG_LEN / CMSG_SPACE arithmetic from <sys/socket.h> is reproduced as
//! const fns so the layout is fixed at compile time.

use std::mem;

use static_assertions::const_assert;

/// CMSG_ALIGN: round `len` up to the kernel's ancillary-data granularity.
const fn cmsg_align(len: usize) -> usize {
    (len + mem::size_of::<usize>() - 1) & !(mem::size_of::<usize>() - 1)
}

/// CMSG_LEN(sizeof(u16)): header plus the segment-size value, no trailing pad.
pub(crate) const SEGMENT_CMSG_LEN: usize =
    cmsg_align(mem::size_of::<libc::cmsghdr>()) + mem::size_of::<u16>();

/// CMSG_SPACE(sizeof(u16)): full block size including trailing padding.
pub(crate) const SEGMENT_CMSG_SPACE: usize =
    cmsg_align(mem::size_of::<libc::cmsghdr>()) + cmsg_align(mem::size_of::<u16>());

/// Byte offset of the segment-size value (CMSG_DATA).
const SEGMENT_DATA_OFFSET: usize = cmsg_align(mem::size_of::<libc::cmsghdr>());

const_assert!(SEGMENT_CMSG_LEN <= SEGMENT_CMSG_SPACE);
const_assert!(SEGMENT_DATA_OFFSET + mem::size_of::<u16>() <= SEGMENT_CMSG_SPACE);

/// One ancillary-data block requesting UDP segmentation offload.
///
/// Over-aligned to 8 bytes so the embedded `cmsghdr` is correctly aligned on
/// every Linux target this crate builds for.
#[derive(Clone, Copy)]
#[repr(C, align(8))]
pub(crate) struct SegmentControl([u8; SEGMENT_CMSG_SPACE]);

impl SegmentControl {
    /// A zeroed block. Not submittable until [`stamp`](Self::stamp) runs.
    pub(crate) const fn zeroed() -> Self {
        Self([0u8; SEGMENT_CMSG_SPACE])
    }

    /// Write the fixed offload directive. Called once per block at context
    /// construction; only the segment size mutates afterwards.
    pub(crate) fn stamp(&mut self) {
        // SAFETY: the buffer spans SEGMENT_CMSG_SPACE bytes and is 8-aligned,
        // so it holds a cmsghdr at offset 0.
        unsafe {
            let hdr = self.0.as_mut_ptr() as *mut libc::cmsghdr;
            (*hdr).cmsg_len = SEGMENT_CMSG_LEN as _;
            (*hdr).cmsg_level = libc::SOL_UDP;
            (*hdr).cmsg_type = libc::UDP_SEGMENT;
        }
    }

    /// Set the segment size for the next submission. Zero leaves the batch
    /// entry unsegmented (the kernel treats 0 as "offload disabled").
    pub(crate) fn set_segment_size(&mut self, size: u16) {
        let bytes = size.to_ne_bytes();
        self.0[SEGMENT_DATA_OFFSET] = bytes[0];
        self.0[SEGMENT_DATA_OFFSET + 1] = bytes[1];
    }

    /// Read back the currently stamped segment size.
    pub(crate) fn segment_size(&self) -> u16 {
        u16::from_ne_bytes([
            self.0[SEGMENT_DATA_OFFSET],
            self.0[SEGMENT_DATA_OFFSET + 1],
        ])
    }

    /// Pointer handed to `msghdr.msg_control`. The caller must keep the
    /// block alive and pinned for as long as the pointer is registered.
    pub(crate) fn as_mut_ptr(&mut self) -> *mut libc::c_void {
        self.0.as_mut_ptr() as *mut libc::c_void
    }
}
