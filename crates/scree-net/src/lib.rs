//! scree-net — kernel-facing batched UDP transmission.
//!
//! Batching rides on `sendmmsg` plus the `UDP_SEGMENT` ancillary directive,
//! so this crate is Linux-only; on other targets it compiles to nothing.
//! The platform-independent packet model and alignment algorithm live in
//! scree-core and compile everywhere.

#[cfg(target_os = "linux")]
pub mod batch;
#[cfg(target_os = "linux")]
mod cmsg;
#[cfg(target_os = "linux")]
pub mod socket;

#[cfg(target_os = "linux")]
pub use batch::{BatchContext, BatchError};
