//! Socket helpers for batch submission.
//!
//! The batch context never owns a socket — the file descriptor is supplied
//! externally and only borrowed for the duration of a submit call. These
//! helpers cover the two things every caller ends up needing: a connected
//! datagram socket with a send buffer sized for bursts, and a probe for
//! whether the running kernel supports UDP segmentation offload at all.

use std::io;
use std::net::{SocketAddr, UdpSocket};
use std::os::fd::AsRawFd;

use socket2::{Domain, Protocol, Socket, Type};

/// Send buffer large enough to absorb several full batches in a burst.
const SEND_BUFFER_BYTES: usize = 4 * 1024 * 1024;

/// Create a UDP socket bound to `local` and connected to `peer`.
///
/// Connected, because batch message headers carry no destination address —
/// every packet in a batch goes to the same peer. Ownership stays with the
/// caller; hand `socket.as_fd()` to [`BatchContext::submit`].
///
/// [`BatchContext::submit`]: crate::batch::BatchContext::submit
pub fn connected_datagram_socket(local: SocketAddr, peer: SocketAddr) -> io::Result<UdpSocket> {
    let socket = Socket::new(Domain::for_address(local), Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_send_buffer_size(SEND_BUFFER_BYTES)?;
    socket.bind(&local.into())?;
    socket.connect(&peer.into())?;
    Ok(socket.into())
}

/// Whether the running kernel accepts the `UDP_SEGMENT` socket option.
///
/// Probes a throwaway socket; an unsupported option reports as a clean
/// `false` rather than an error, so callers can degrade to unsegmented
/// sends. Value 0 keeps offload disabled on the probe socket itself.
pub fn segmentation_offload_supported() -> bool {
    let Ok(socket) = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP)) else {
        return false;
    };

    let fd = socket.as_raw_fd();
    let value: libc::c_int = 0;
    // SAFETY: fd is a live socket owned by this function; the value pointer
    // and length describe a c_int, which is what SOL_UDP options expect.
    let rc = unsafe {
        libc::setsockopt(
            fd,
            libc::SOL_UDP,
            libc::UDP_SEGMENT,
            &value as *const _ as *const libc::c_void,
            std::mem::size_of::<libc::c_int>() as libc::socklen_t,
        )
    };
    rc == 0
}
