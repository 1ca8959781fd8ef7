//! Ordered, acknowledged delivery of lifecycle RPCs over UDP
//!
//! Every outgoing RPC gets a sequence number and stays queued until the peer
//! acknowledges it. Acks are cumulative: the receiver reports the next
//! sequence it expects, which releases everything below it. Out-of-order
//! arrivals are parked until the gap is filled so the application always
//! sees RPCs in send order, and duplicates are discarded.

use crate::protocol::Rpc;
use std::collections::BTreeMap;
use std::time::{Duration, Instant};

/// How long an unacknowledged RPC waits before it is sent again
pub const DEFAULT_RESEND_INTERVAL: Duration = Duration::from_millis(200);

/// How far ahead of the next expected sequence an arrival may be parked.
/// Anything further is dropped and left to the sender's resend.
pub const RELIABLE_WINDOW: u32 = 256;

#[derive(Debug)]
struct Outgoing {
    rpc: Rpc,
    last_sent: Option<Instant>,
}

#[derive(Debug)]
pub struct ReliableChannel {
    next_send_sequence: u32,
    unacked: BTreeMap<u32, Outgoing>,
    next_expected: u32,
    parked: BTreeMap<u32, Rpc>,
    resend_interval: Duration,
}

impl ReliableChannel {
    pub fn new(resend_interval: Duration) -> Self {
        Self {
            next_send_sequence: 0,
            unacked: BTreeMap::new(),
            next_expected: 0,
            parked: BTreeMap::new(),
            resend_interval,
        }
    }

    /// Queues an RPC for delivery and returns its sequence number
    pub fn push(&mut self, rpc: Rpc) -> u32 {
        let sequence = self.next_send_sequence;
        self.next_send_sequence = self.next_send_sequence.wrapping_add(1);
        self.unacked.insert(
            sequence,
            Outgoing {
                rpc,
                last_sent: None,
            },
        );
        sequence
    }

    /// Returns every RPC that has never been sent or whose resend interval
    /// elapsed, marking them as sent at `now`
    pub fn due_for_send(&mut self, now: Instant) -> Vec<(u32, Rpc)> {
        let mut due = Vec::new();
        for (sequence, outgoing) in self.unacked.iter_mut() {
            let ready = match outgoing.last_sent {
                None => true,
                Some(sent) => now.duration_since(sent) >= self.resend_interval,
            };
            if ready {
                outgoing.last_sent = Some(now);
                due.push((*sequence, outgoing.rpc.clone()));
            }
        }
        due
    }

    /// Releases every RPC below the peer's next expected sequence
    pub fn acknowledge(&mut self, next_expected: u32) {
        self.unacked.retain(|sequence, _| *sequence >= next_expected);
    }

    /// Accepts an incoming RPC and returns the RPCs that became deliverable,
    /// in order. Duplicates, already delivered sequences and sequences
    /// outside the receive window yield nothing.
    pub fn receive(&mut self, sequence: u32, rpc: Rpc) -> Vec<Rpc> {
        if sequence < self.next_expected
            || sequence >= self.next_expected.saturating_add(RELIABLE_WINDOW)
        {
            return Vec::new();
        }
        self.parked.entry(sequence).or_insert(rpc);

        let mut delivered = Vec::new();
        while let Some(rpc) = self.parked.remove(&self.next_expected) {
            delivered.push(rpc);
            self.next_expected += 1;
        }
        delivered
    }

    /// Cumulative ack value to report back to the peer
    pub fn next_expected(&self) -> u32 {
        self.next_expected
    }

    pub fn unacked_len(&self) -> usize {
        self.unacked.len()
    }

    /// Out-of-order arrivals waiting for a gap to fill
    pub fn parked_len(&self) -> usize {
        self.parked.len()
    }
}

impl Default for ReliableChannel {
    fn default() -> Self {
        Self::new(DEFAULT_RESEND_INTERVAL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chat(message: &str) -> Rpc {
        Rpc::PlayerChat {
            player_id: 1,
            message: message.to_string(),
        }
    }

    #[test]
    fn test_push_assigns_increasing_sequences() {
        let mut channel = ReliableChannel::default();
        assert_eq!(channel.push(chat("a")), 0);
        assert_eq!(channel.push(chat("b")), 1);
        assert_eq!(channel.unacked_len(), 2);
    }

    #[test]
    fn test_resend_waits_for_interval() {
        let mut channel = ReliableChannel::new(Duration::from_millis(100));
        channel.push(chat("a"));

        let start = Instant::now();
        assert_eq!(channel.due_for_send(start).len(), 1);
        assert!(channel.due_for_send(start + Duration::from_millis(50)).is_empty());
        assert_eq!(
            channel.due_for_send(start + Duration::from_millis(100)).len(),
            1
        );
    }

    #[test]
    fn test_cumulative_ack_releases_messages() {
        let mut channel = ReliableChannel::default();
        channel.push(chat("a"));
        channel.push(chat("b"));
        channel.push(chat("c"));

        channel.acknowledge(2);
        let due = channel.due_for_send(Instant::now());
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].0, 2);
    }

    #[test]
    fn test_out_of_order_delivery_is_reordered() {
        let mut channel = ReliableChannel::default();

        assert!(channel.receive(1, chat("b")).is_empty());
        assert!(channel.receive(2, chat("c")).is_empty());
        assert_eq!(channel.next_expected(), 0);

        let delivered = channel.receive(0, chat("a"));
        assert_eq!(delivered, vec![chat("a"), chat("b"), chat("c")]);
        assert_eq!(channel.next_expected(), 3);
    }

    #[test]
    fn test_duplicates_are_dropped() {
        let mut channel = ReliableChannel::default();

        assert_eq!(channel.receive(0, chat("a")).len(), 1);
        assert!(channel.receive(0, chat("a")).is_empty());
        assert_eq!(channel.next_expected(), 1);
    }

    #[test]
    fn test_far_ahead_sequences_are_not_parked() {
        let mut channel = ReliableChannel::default();

        for i in 0..10_000u32 {
            assert!(channel.receive(i * 7 + 1_000_000, chat("flood")).is_empty());
        }
        assert_eq!(channel.parked_len(), 0);

        assert!(channel.receive(RELIABLE_WINDOW, chat("edge")).is_empty());
        assert!(channel.receive(RELIABLE_WINDOW - 1, chat("last")).is_empty());
        assert_eq!(channel.parked_len(), 1);
        assert_eq!(channel.next_expected(), 0);

        assert_eq!(channel.receive(0, chat("a")), vec![chat("a")]);
    }
}
