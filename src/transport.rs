//! The link-layer seam between simulated clients and the wire.
//!
//! Engines never touch sockets directly: they hand complete Ethernet frames
//! to a [`Transport`] and ask it for the first frame accepted by a filter.

use crate::error::SwarmError;
use async_trait::async_trait;
use bytes::Bytes;
use std::time::Duration;

/// Predicate applied to every captured frame.
pub type FrameFilter<'a> = &'a (dyn Fn(&[u8]) -> bool + Send + Sync);

#[async_trait]
pub trait Transport: Send + Sync {
    /// Transmits one complete Ethernet frame.
    async fn send_frame(&self, frame: Bytes) -> Result<(), SwarmError>;

    /// Returns the first frame accepted by `filter`, or `None` once `timeout` elapses.
    ///
    /// Only frames received after the most recent [`send_frame`](Transport::send_frame)
    /// are considered.
    async fn capture_one(
        &self,
        filter: FrameFilter<'_>,
        timeout: Duration,
    ) -> Result<Option<Bytes>, SwarmError>;
}
