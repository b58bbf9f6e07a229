//! scree-core — platform-independent model and algorithm for batched
//! outbound media transmission.
//!
//! This crate knows nothing about sockets or kernel structures. It holds the
//! per-slot packet records and the length-alignment algorithm; the
//! kernel-facing transmission context lives in scree-net.

pub mod align;
pub mod packet;

pub use align::{align_by_length, Alignment};
pub use packet::{MediaKind, PacketError, PacketRecord, RtpExtensions, MTU};
