//! Bidirectional splicer
//!
//! Copies bytes between two connected streams, in both directions, until one
//! side reaches EOF, an I/O error occurs, or neither side produces data for
//! the idle timeout.

use crate::error::RelayError;
use crate::helper::DEFAULT_TRANSFER_BUFFER_SIZE;
use std::io;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// One of the two spliced streams
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    /// First stream passed to [`splice`]
    A,
    /// Second stream passed to [`splice`]
    B,
}

/// Why a splice ended without error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// The given side reached end of stream
    Eof(Side),
    /// No data in either direction for the idle timeout
    IdleTimeout,
}

/// Summary of a finished splice
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpliceReport {
    /// Bytes copied from A to B
    pub a_to_b: u64,
    /// Bytes copied from B to A
    pub b_to_a: u64,
    /// Termination condition
    pub reason: CloseReason,
}

/// Relay data between `a` and `b` until termination
///
/// Waits for whichever stream becomes readable first, and writes what was
/// read verbatim to the other one. Writes are awaited in full, so a slow
/// reader throttles the opposite producer through the socket buffers. A write
/// that makes no progress for the idle timeout ends the splice like an idle
/// read does.
///
/// The streams are not shut down here; the caller owns and closes both.
pub async fn splice<A, B>(
    a: &mut A,
    b: &mut B,
    idle_timeout: Duration,
) -> Result<SpliceReport, RelayError>
where
    A: AsyncRead + AsyncWrite + Unpin + ?Sized,
    B: AsyncRead + AsyncWrite + Unpin + ?Sized,
{
    let mut buf_a = vec![0u8; DEFAULT_TRANSFER_BUFFER_SIZE];
    let mut buf_b = vec![0u8; DEFAULT_TRANSFER_BUFFER_SIZE];
    let mut a_to_b = 0u64;
    let mut b_to_a = 0u64;

    let finish = |reason, a_to_b, b_to_a| SpliceReport {
        a_to_b,
        b_to_a,
        reason,
    };

    loop {
        let ready = tokio::time::timeout(
            idle_timeout,
            read_either(&mut *a, &mut *b, &mut buf_a, &mut buf_b),
        )
        .await;

        let (side, result) = match ready {
            Ok(ready) => ready,
            Err(_) => return Ok(finish(CloseReason::IdleTimeout, a_to_b, b_to_a)),
        };

        let n = result.map_err(RelayError::RelayIo)?;
        if n == 0 {
            return Ok(finish(CloseReason::Eof(side), a_to_b, b_to_a));
        }

        // A peer that stops reading stalls the write; that counts as idle too
        let written = match side {
            Side::A => {
                tokio::time::timeout(idle_timeout, write_chunk(&mut *b, &buf_a[..n])).await
            }
            Side::B => {
                tokio::time::timeout(idle_timeout, write_chunk(&mut *a, &buf_b[..n])).await
            }
        };
        match written {
            Ok(result) => result?,
            Err(_) => return Ok(finish(CloseReason::IdleTimeout, a_to_b, b_to_a)),
        }

        match side {
            Side::A => a_to_b += n as u64,
            Side::B => b_to_a += n as u64,
        }
    }
}

/// Read from whichever stream has data first
async fn read_either<A, B>(
    a: &mut A,
    b: &mut B,
    buf_a: &mut [u8],
    buf_b: &mut [u8],
) -> (Side, io::Result<usize>)
where
    A: AsyncRead + Unpin + ?Sized,
    B: AsyncRead + Unpin + ?Sized,
{
    tokio::select! {
        result = a.read(buf_a) => (Side::A, result),
        result = b.read(buf_b) => (Side::B, result),
    }
}

async fn write_chunk<W>(stream: &mut W, chunk: &[u8]) -> Result<(), RelayError>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    stream.write_all(chunk).await.map_err(RelayError::RelayIo)?;
    stream.flush().await.map_err(RelayError::RelayIo)
}
