//! Scree integration tests — the full staging → alignment → submission path
//! over real loopback sockets.
//!
//! Segmentation offload needs kernel support (`UDP_SEGMENT`, Linux 4.18+).
//! Tests that depend on it probe first and skip gracefully on kernels
//! without it, so the suite passes everywhere it compiles.

#![cfg(target_os = "linux")]

use std::net::UdpSocket;
use std::os::fd::AsFd;
use std::time::Duration;

use anyhow::{Context, Result};

use scree_core::{MediaKind, MTU};
use scree_net::socket::{connected_datagram_socket, segmentation_offload_supported};
use scree_net::BatchContext;

// ── Harness ───────────────────────────────────────────────────────────────────

/// Loopback pair: a bound receiver and a sender connected to it.
fn socket_pair() -> Result<(UdpSocket, UdpSocket)> {
    let receiver = UdpSocket::bind("127.0.0.1:0").context("failed to bind receiver")?;
    receiver
        .set_read_timeout(Some(Duration::from_secs(2)))
        .context("failed to set receive timeout")?;

    let local = "127.0.0.1:0".parse().expect("literal address");
    let sender = connected_datagram_socket(local, receiver.local_addr()?)
        .context("failed to create connected sender")?;

    Ok((sender, receiver))
}

/// Collect `n` datagrams as (length, first byte) pairs, order-insensitive.
fn recv_all(receiver: &UdpSocket, n: usize) -> Result<Vec<(usize, u8)>> {
    let mut buf = [0u8; MTU];
    let mut seen = Vec::with_capacity(n);
    for _ in 0..n {
        let len = receiver.recv(&mut buf).context("receive timed out")?;
        seen.push((len, buf[0]));
    }
    seen.sort_unstable();
    Ok(seen)
}

// ── Tests ─────────────────────────────────────────────────────────────────────

/// The full path: stage mixed-size packets, align, stamp the leading run,
/// submit once, and receive every datagram intact.
#[test]
fn full_batch_path() -> Result<()> {
    if !segmentation_offload_supported() {
        eprintln!("SKIP: kernel lacks UDP_SEGMENT support");
        return Ok(());
    }

    let (sender, receiver) = socket_pair()?;
    let mut ctx = BatchContext::new(4).map_err(anyhow::Error::new)?;

    for (slot, len) in [700usize, 1200, 700, 1200].into_iter().enumerate() {
        let record = ctx
            .stage(slot, &vec![slot as u8; len])
            .map_err(anyhow::Error::new)?;
        record.kind = MediaKind::Video;
        record.stream = Some(slot as u16);
    }

    let alignment = ctx.align();
    assert_eq!(alignment.max_len, 1200);
    assert_eq!(alignment.run, 2);
    ctx.stamp_segment_sizes(alignment);

    let sent = ctx.submit(sender.as_fd(), 4)?;
    assert_eq!(sent, 4, "kernel accepted fewer messages than requested");

    let seen = recv_all(&receiver, 4)?;
    assert_eq!(seen, vec![(700, 0), (700, 2), (1200, 1), (1200, 3)]);
    Ok(())
}

/// A context is reused across batches: the second batch simply overwrites
/// the first, with no clearing step in between.
#[test]
fn context_reuse_across_batches() -> Result<()> {
    if !segmentation_offload_supported() {
        eprintln!("SKIP: kernel lacks UDP_SEGMENT support");
        return Ok(());
    }

    let (sender, receiver) = socket_pair()?;
    let mut ctx = BatchContext::new(2).map_err(anyhow::Error::new)?;

    for round in 0u8..3 {
        let len = 100 + round as usize * 50;
        ctx.stage(0, &vec![round; len]).map_err(anyhow::Error::new)?;
        ctx.stage(1, &vec![round; len]).map_err(anyhow::Error::new)?;
        let alignment = ctx.align();
        assert_eq!(alignment.run, 2);
        ctx.stamp_segment_sizes(alignment);

        assert_eq!(ctx.submit(sender.as_fd(), 2)?, 2);
        let seen = recv_all(&receiver, 2)?;
        assert_eq!(seen, vec![(len, round), (len, round)]);
    }

    // A mixed-length batch after an all-equal one: the shorter packet's
    // control block still carries last round's stamp until restamping
    // clears it, and a stale stamp would split the packet on the wire.
    ctx.stage(0, &[0xa0; 1200]).map_err(anyhow::Error::new)?;
    ctx.stage(1, &[0xa1; 700]).map_err(anyhow::Error::new)?;
    let alignment = ctx.align();
    assert_eq!(alignment.run, 1);
    ctx.stamp_segment_sizes(alignment);

    assert_eq!(ctx.submit(sender.as_fd(), 2)?, 2);
    let seen = recv_all(&receiver, 2)?;
    assert_eq!(seen, vec![(700, 0xa1), (1200, 0xa0)]);
    Ok(())
}

/// Segmentation offload observable end to end: one 1200-byte slot stamped
/// with a 400-byte segment size arrives as three 400-byte datagrams.
#[test]
fn offload_splits_a_slot_into_equal_segments() -> Result<()> {
    if !segmentation_offload_supported() {
        eprintln!("SKIP: kernel lacks UDP_SEGMENT support");
        return Ok(());
    }

    let (sender, receiver) = socket_pair()?;
    let mut ctx = BatchContext::new(1).map_err(anyhow::Error::new)?;

    ctx.stage(0, &[0x5c; 1200]).map_err(anyhow::Error::new)?;
    ctx.set_segment_size(0, 400).map_err(anyhow::Error::new)?;

    assert_eq!(ctx.submit(sender.as_fd(), 1)?, 1);

    let seen = recv_all(&receiver, 3)?;
    assert_eq!(seen, vec![(400, 0x5c), (400, 0x5c), (400, 0x5c)]);
    Ok(())
}

/// Construct-and-drop churn across capacities. Nothing to assert beyond
/// survival: every owned array must be released exactly once per context.
#[test]
fn construction_teardown_churn() {
    for _ in 0..50 {
        for count in [1usize, 3, 16, 100] {
            let ctx = BatchContext::new(count).expect("construction failed");
            assert_eq!(ctx.capacity(), count);
            drop(ctx);
        }
    }
}
