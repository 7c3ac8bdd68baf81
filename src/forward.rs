//! Forwarding task: drain the ring, hand blocks to the transport, back off
//! under backpressure.
//!
//! # Policy
//!
//! - Accepted send: short poll delay, then drain again (rate matching).
//! - Rejected send: the block is kept and re-sent first on the next poll,
//!   after the longer backoff delay. Order is never broken.
//! - A block still rejected after `max_retries` retries is discarded and
//!   counted; the ring keeps overwriting the oldest samples meanwhile.
//! - A drain that fills the whole block is counted as saturated: the ring
//!   may be filling faster than it drains.
//!
//! Counters are published after every non-idle poll to a shared
//! [`ForwardHealth`] the supervisor reads. When run against a
//! [`DaqConfig`], the policy is reloaded whenever its generation moves.

use alloc::sync::Arc;
use alloc::vec;
use alloc::vec::Vec;
use core::sync::atomic::{AtomicBool, Ordering};

use embedded_hal::delay::DelayNs;

use crate::config::{DaqConfig, DaqSettings};
use crate::log_globals::NET_LOG_STREAM;
use crate::logging::timestamp_us;
use crate::ring::{Drained, SampleRing};
use crate::stats::{ForwardHealth, ForwardStats};
use crate::wire;

/// Streaming socket (or anything else that takes bytes).
pub trait Transport {
    /// Hand over `bytes`. `false` means not accepted (backpressure);
    /// nothing of a rejected call counts as sent.
    fn send(&mut self, bytes: &[u8]) -> bool;
}

impl<T: Transport + ?Sized> Transport for &mut T {
    fn send(&mut self, bytes: &[u8]) -> bool {
        (**self).send(bytes)
    }
}

/// Where samples come from.
pub trait SampleSource {
    /// Non-blocking drain in capture order.
    fn drain_into(&self, out: &mut [i16]) -> Drained;
}

impl<S: SampleSource + ?Sized> SampleSource for Arc<S> {
    fn drain_into(&self, out: &mut [i16]) -> Drained {
        (**self).drain_into(out)
    }
}

impl<S: SampleSource + ?Sized> SampleSource for &S {
    fn drain_into(&self, out: &mut [i16]) -> Drained {
        (**self).drain_into(out)
    }
}

impl SampleSource for SampleRing {
    fn drain_into(&self, out: &mut [i16]) -> Drained {
        SampleRing::drain_into(self, out)
    }
}

/// Backpressure tuning.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ForwardPolicy {
    /// Samples per drain / send.
    pub block_len: usize,
    /// Delay after an accepted send or an empty poll.
    pub poll_delay_ms: u32,
    /// Delay after a rejected send.
    pub backoff_ms: u32,
    /// Retries of a rejected block before it is discarded.
    pub max_retries: u32,
}

impl ForwardPolicy {
    pub fn from_settings(settings: &DaqSettings) -> Self {
        Self {
            block_len: (settings.block_len as usize).max(1),
            poll_delay_ms: settings.poll_delay_ms,
            backoff_ms: settings.backoff_ms,
            max_retries: settings.max_retries,
        }
    }
}

impl Default for ForwardPolicy {
    fn default() -> Self {
        Self {
            block_len: wire::MAX_PACKET_BYTES / wire::SAMPLE_BYTES,
            poll_delay_ms: 5,
            backoff_ms: 50,
            max_retries: 20,
        }
    }
}

/// Outcome of one [`Forwarder::poll`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Poll {
    /// Nothing to send.
    Idle,
    /// Block accepted by the transport.
    Sent { samples: usize, rate: Option<f32> },
    /// Block rejected and held for retry.
    Backpressure { retries: u32 },
    /// Block dropped after too many rejections.
    Discarded { samples: usize },
}

pub struct Forwarder<S, T> {
    source: S,
    transport: T,
    policy: ForwardPolicy,
    block: Vec<i16>,
    bytes: Vec<u8>,
    /// Samples encoded in `bytes` not yet accepted.
    pending: usize,
    pending_rate: Option<f32>,
    retries: u32,
    stats: ForwardStats,
    health: Arc<ForwardHealth>,
    /// Config generation the policy was last loaded from.
    seen_generation: Option<u32>,
}

impl<S: SampleSource, T: Transport> Forwarder<S, T> {
    pub fn new(source: S, transport: T, policy: ForwardPolicy) -> Self {
        let block_len = policy.block_len.max(1);
        Self {
            source,
            transport,
            policy: ForwardPolicy { block_len, ..policy },
            block: vec![0; block_len],
            bytes: Vec::with_capacity(block_len * wire::SAMPLE_BYTES),
            pending: 0,
            pending_rate: None,
            retries: 0,
            stats: ForwardStats::new(),
            health: Arc::new(ForwardHealth::new()),
            seen_generation: None,
        }
    }

    /// One step: resend the held block, or drain a new one and send it.
    pub fn poll(&mut self) -> Poll {
        let poll = self.step();
        if poll != Poll::Idle {
            self.health.publish(&self.stats);
        }
        poll
    }

    fn step(&mut self) -> Poll {
        if self.pending == 0 {
            let drained = self.source.drain_into(&mut self.block);
            if drained.count == 0 {
                return Poll::Idle;
            }

            let rate = drained.rate_hz();
            self.stats
                .record_drain(drained.count == self.policy.block_len, rate);
            self.bytes.clear();
            wire::encode_samples(&self.block[..drained.count], &mut self.bytes);
            self.pending = drained.count;
            self.pending_rate = rate;
        }

        self.try_send()
    }

    fn try_send(&mut self) -> Poll {
        let samples = self.pending;

        if self.transport.send(&self.bytes) {
            self.stats.record_forwarded(samples);
            self.pending = 0;
            self.retries = 0;
            return Poll::Sent {
                samples,
                rate: self.pending_rate.take(),
            };
        }

        self.stats.record_rejected();
        self.retries += 1;
        if self.retries > self.policy.max_retries {
            self.stats.record_discarded(samples);
            self.pending = 0;
            self.retries = 0;
            self.pending_rate = None;
            return Poll::Discarded { samples };
        }
        Poll::Backpressure {
            retries: self.retries,
        }
    }

    /// Delay before the next poll.
    pub fn delay_ms(&self, poll: &Poll) -> u32 {
        match poll {
            Poll::Backpressure { .. } => self.policy.backoff_ms,
            Poll::Idle | Poll::Sent { .. } | Poll::Discarded { .. } => self.policy.poll_delay_ms,
        }
    }

    /// Reload the policy from `config` if it changed since the last call.
    ///
    /// A held block keeps its encoded bytes; only later drains use the new
    /// block length. Returns `true` when the policy was reloaded.
    pub fn follow_config(&mut self, config: &DaqConfig) -> bool {
        let generation = config.generation();
        if self.seen_generation == Some(generation) {
            return false;
        }
        self.seen_generation = Some(generation);

        let policy = ForwardPolicy::from_settings(&config.snapshot());
        if policy == self.policy {
            return false;
        }
        self.block.resize(policy.block_len, 0);
        self.policy = policy;
        true
    }

    /// Poll until `running` is cleared.
    pub fn run(&mut self, delay: &mut impl DelayNs, running: &AtomicBool) {
        self.run_loop(delay, running, None);
    }

    /// [`run`](Self::run), following policy changes in `config`.
    pub fn run_with_config(
        &mut self,
        delay: &mut impl DelayNs,
        running: &AtomicBool,
        config: &DaqConfig,
    ) {
        self.run_loop(delay, running, Some(config));
    }

    fn run_loop(&mut self, delay: &mut impl DelayNs, running: &AtomicBool, config: Option<&DaqConfig>) {
        while running.load(Ordering::Acquire) {
            if let Some(config) = config {
                if self.follow_config(config) {
                    crate::rt_info!(
                        NET_LOG_STREAM,
                        timestamp_us(),
                        "forward policy: block {} poll {}ms backoff {}ms retries {}",
                        self.policy.block_len,
                        self.policy.poll_delay_ms,
                        self.policy.backoff_ms,
                        self.policy.max_retries
                    );
                }
            }
            let poll = self.poll();
            match poll {
                Poll::Backpressure { retries: 1 } => {
                    crate::rt_debug!(NET_LOG_STREAM, timestamp_us(), "transport busy, backing off");
                }
                Poll::Discarded { samples } => {
                    crate::rt_warn!(
                        NET_LOG_STREAM,
                        timestamp_us(),
                        "discarded {} samples after {} rejections",
                        samples,
                        self.policy.max_retries + 1
                    );
                }
                _ => {}
            }
            delay.delay_ms(self.delay_ms(&poll));
        }
    }

    /// Samples held for retry.
    pub fn pending(&self) -> usize {
        self.pending
    }

    pub fn stats(&self) -> ForwardStats {
        self.stats.snapshot()
    }

    /// Shared view of [`stats`](Self::stats), updated after every non-idle poll.
    pub fn health(&self) -> Arc<ForwardHealth> {
        Arc::clone(&self.health)
    }

    pub fn policy(&self) -> &ForwardPolicy {
        &self.policy
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn into_parts(self) -> (S, T) {
        (self.source, self.transport)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Scripted {
        accept: std::vec::Vec<bool>,
        sent: std::vec::Vec<std::vec::Vec<u8>>,
    }

    impl Transport for Scripted {
        fn send(&mut self, bytes: &[u8]) -> bool {
            let ok = if self.accept.is_empty() { true } else { self.accept.remove(0) };
            if ok {
                self.sent.push(bytes.to_vec());
            }
            ok
        }
    }

    fn policy(block_len: usize, max_retries: u32) -> ForwardPolicy {
        ForwardPolicy { block_len, poll_delay_ms: 5, backoff_ms: 50, max_retries }
    }

    #[test]
    fn test_idle_when_empty() {
        let ring = SampleRing::new(8);
        let mut fwd = Forwarder::new(&ring, Scripted { accept: vec![], sent: vec![] }, policy(4, 3));
        assert_eq!(fwd.poll(), Poll::Idle);
        assert_eq!(fwd.delay_ms(&Poll::Idle), 5);
        assert_eq!(fwd.stats().drains, 0);
    }

    #[test]
    fn test_rejected_block_is_resent_first() {
        let ring = SampleRing::new(8);
        for s in 0..6 {
            ring.push(s, 1_000);
        }
        let transport = Scripted { accept: vec![false, true, true], sent: vec![] };
        let mut fwd = Forwarder::new(&ring, transport, policy(4, 3));

        let p = fwd.poll();
        assert_eq!(p, Poll::Backpressure { retries: 1 });
        assert_eq!(fwd.delay_ms(&p), 50);
        assert_eq!(fwd.pending(), 4);

        assert!(matches!(fwd.poll(), Poll::Sent { samples: 4, rate: Some(r) } if r == 1000.0));
        assert!(matches!(fwd.poll(), Poll::Sent { samples: 2, .. }));

        let stats = fwd.stats();
        assert_eq!(stats.drains, 2);
        assert_eq!(stats.saturated, 1);
        assert_eq!(stats.rejected, 1);
        assert_eq!(stats.forwarded_samples, 6);
        assert_eq!(fwd.transport().sent[0], [0, 0, 1, 0, 2, 0, 3, 0]);
    }

    #[test]
    fn test_discard_after_max_retries() {
        let ring = SampleRing::new(8);
        ring.push(7, 10);
        let transport = Scripted { accept: vec![false; 3], sent: vec![] };
        let mut fwd = Forwarder::new(&ring, transport, policy(4, 2));

        assert_eq!(fwd.poll(), Poll::Backpressure { retries: 1 });
        assert_eq!(fwd.poll(), Poll::Backpressure { retries: 2 });
        assert_eq!(fwd.poll(), Poll::Discarded { samples: 1 });
        assert_eq!(fwd.pending(), 0);
        assert_eq!(fwd.poll(), Poll::Idle);

        let stats = fwd.stats();
        assert_eq!(stats.discarded_blocks, 1);
        assert_eq!(stats.discarded_samples, 1);
        assert_eq!(stats.rejected, 3);
    }

    #[test]
    fn test_policy_from_settings() {
        let p = ForwardPolicy::from_settings(&DaqSettings::DEFAULT);
        assert_eq!(p, ForwardPolicy::default());
    }

    #[test]
    fn test_follows_config_generation() {
        let ring = SampleRing::new(16);
        let config = DaqConfig::default();
        let mut fwd = Forwarder::new(&ring, Scripted { accept: vec![], sent: vec![] }, policy(4, 3));

        assert!(fwd.follow_config(&config));
        assert_eq!(*fwd.policy(), ForwardPolicy::from_settings(&DaqSettings::DEFAULT));
        assert!(!fwd.follow_config(&config));

        config.set_block_len(3).unwrap();
        config.set_backpressure(1, 200, 7);
        assert!(fwd.follow_config(&config));
        assert_eq!(*fwd.policy(), ForwardPolicy { block_len: 3, poll_delay_ms: 1, backoff_ms: 200, max_retries: 7 });

        for s in 0..5 {
            ring.push(s, 100);
        }
        assert!(matches!(fwd.poll(), Poll::Sent { samples: 3, .. }));
        assert!(matches!(fwd.poll(), Poll::Sent { samples: 2, .. }));
    }
}
