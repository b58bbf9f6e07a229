//! Outbound packet records — per-slot metadata for a transmission batch.
//!
//! A record never owns payload bytes. The batch context owns one contiguous
//! buffer pool and a record names its region by slot index; filling a slot
//! overwrites whatever was there before, with no release step. Records are
//! cheap to reorder — moving one around never moves payload bytes.

use static_assertions::const_assert;

/// Size in bytes of one pool slot, and the upper bound on a single packet's
/// payload: 1500-byte Ethernet MTU minus 20 bytes IPv4 and 8 bytes UDP.
pub const MTU: usize = 1472;

// Slot lengths travel through 16-bit segment-size fields.
const_assert!(MTU <= u16::MAX as usize);

/// Maximum size of a dependency descriptor carried alongside a packet.
pub const MAX_DD_LEN: usize = 256;

/// Errors from packet record bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PacketError {
    #[error("dependency descriptor of {0} bytes exceeds maximum {MAX_DD_LEN}")]
    DescriptorTooLarge(usize),
}

/// What kind of media a slot currently carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MediaKind {
    #[default]
    Audio,
    Video,
    /// Non-RTP application data relayed over the same batch path.
    Data,
}

/// Parsed RTP header-extension fields carried alongside a packet.
///
/// Extensions are absent unless upstream packetization explicitly sets them;
/// `Default` restores every field to its absent state.
#[derive(Debug, Clone)]
pub struct RtpExtensions {
    /// Audio level in -dBov (0 loudest, 127 silence), if negotiated.
    pub audio_level: Option<u8>,
    /// Voice-activity flag accompanying the audio level.
    pub audio_level_vad: bool,
    /// Video rotation in degrees (0, 90, 180, 270), if negotiated.
    pub video_rotation: Option<u16>,
    pub video_back_camera: bool,
    pub video_flipped: bool,
    /// Playout delay bounds in multiples of 10ms, if negotiated.
    pub min_delay: Option<u16>,
    pub max_delay: Option<u16>,
    /// AV1 dependency descriptor bytes. Only the first `dd_len` are valid.
    pub dd_content: [u8; MAX_DD_LEN],
    pub dd_len: usize,
}

impl Default for RtpExtensions {
    fn default() -> Self {
        Self {
            audio_level: None,
            audio_level_vad: false,
            video_rotation: None,
            video_back_camera: false,
            video_flipped: false,
            min_delay: None,
            max_delay: None,
            dd_content: [0u8; MAX_DD_LEN],
            dd_len: 0,
        }
    }
}

impl RtpExtensions {
    /// The valid prefix of the dependency descriptor. Empty when unset.
    pub fn dependency_descriptor(&self) -> &[u8] {
        &self.dd_content[..self.dd_len]
    }

    pub fn set_dependency_descriptor(&mut self, bytes: &[u8]) -> Result<(), PacketError> {
        if bytes.len() > MAX_DD_LEN {
            return Err(PacketError::DescriptorTooLarge(bytes.len()));
        }
        self.dd_content[..bytes.len()].copy_from_slice(bytes);
        self.dd_len = bytes.len();
        Ok(())
    }
}

/// One outbound packet's metadata: a view into the batch context's pool.
#[derive(Debug, Clone, Default)]
pub struct PacketRecord {
    /// Payload bytes currently occupying this record's slot.
    /// 0 means the record is empty/unused. Never exceeds [`MTU`].
    pub length: u16,
    /// Index of the pool region holding this record's payload.
    /// Stays with the record when the batch is reordered.
    pub slot: usize,
    /// Sub-stream index within the session, if demultiplexed.
    pub stream: Option<u16>,
    pub kind: MediaKind,
    pub extensions: RtpExtensions,
}

impl PacketRecord {
    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    /// Restore the record to its empty state. The payload bytes in the pool
    /// are left as-is — an empty record simply no longer describes them.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
