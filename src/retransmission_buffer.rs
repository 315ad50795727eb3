#[cfg(test)]
mod retransmission_buffer_test;

use std::time::{Duration, Instant};

/// Half of the u16 range, used for sequence-number wraparound detection:
/// `a` precedes `b` iff `(b - a) mod 2^16 < 2^15`.
const SEQ_NUM_HALF: u16 = 1 << 15;

/// Configuration of a [`RetransmissionBuffer`].
#[derive(Debug, Clone, Copy)]
pub struct RetransmissionBufferOptions {
    /// Number of slots; must be a power of two between 1 and 32768.
    pub capacity: u16,
    /// Entries older than this at lookup time are treated as misses.
    pub max_age: Option<Duration>,
}

impl Default for RetransmissionBufferOptions {
    fn default() -> Self {
        RetransmissionBufferOptions {
            capacity: 512,
            max_age: Some(Duration::from_millis(1000)),
        }
    }
}

struct Entry {
    packet: rtp::Packet,
    inserted_at: Instant,
}

/// A bounded history of received RTP packets, indexed by sequence number and
/// used to answer NACK requests.
///
/// The buffer is a circular array: a packet lives in slot
/// `sequence_number % capacity` until a newer packet claims the slot. Gaps
/// between the previous newest and an inserted packet clear the skipped
/// slots so stale packets from a previous lap cannot be returned.
pub struct RetransmissionBuffer {
    entries: Vec<Option<Entry>>,
    capacity: u16,
    max_age: Option<Duration>,
    newest: u16,
    started: bool,
}

impl RetransmissionBuffer {
    pub fn new(options: RetransmissionBufferOptions) -> Self {
        assert!(
            options.capacity != 0 && options.capacity.is_power_of_two(),
            "retransmission buffer capacity must be a power of two"
        );

        let mut entries = Vec::with_capacity(options.capacity as usize);
        entries.resize_with(options.capacity as usize, || None);

        RetransmissionBuffer {
            entries,
            capacity: options.capacity,
            max_age: options.max_age,
            newest: 0,
            started: false,
        }
    }

    /// Stores an owned copy of the packet, keyed by its sequence number.
    pub fn insert(&mut self, packet: &rtp::Packet) {
        let seq = packet.header.sequence_number;
        let entry = Entry {
            packet: packet.clone(),
            inserted_at: Instant::now(),
        };

        if !self.started {
            self.entries[(seq % self.capacity) as usize] = Some(entry);
            self.newest = seq;
            self.started = true;
            return;
        }

        let diff = seq.wrapping_sub(self.newest);
        if diff == 0 {
            // Duplicate of the newest packet; keep the first copy.
            return;
        }
        if diff < SEQ_NUM_HALF {
            // The packet advances the window; clear the slots skipped over.
            let mut i = self.newest.wrapping_add(1);
            while i != seq {
                self.entries[(i % self.capacity) as usize] = None;
                i = i.wrapping_add(1);
            }
            self.newest = seq;
        }
        // An out-of-order packet fills its old slot without moving the window.

        self.entries[(seq % self.capacity) as usize] = Some(entry);
    }

    /// Looks up a packet by sequence number. The reference is valid until the
    /// next [`insert`](Self::insert).
    pub fn get(&self, seq: u16) -> Option<&rtp::Packet> {
        if !self.started {
            return None;
        }

        let behind = self.newest.wrapping_sub(seq);
        if behind >= SEQ_NUM_HALF {
            // The requested number is ahead of everything received.
            return None;
        }
        if behind >= self.capacity {
            return None;
        }

        let entry = self.entries[(seq % self.capacity) as usize].as_ref()?;
        if entry.packet.header.sequence_number != seq {
            return None;
        }
        if let Some(max_age) = self.max_age {
            if entry.inserted_at.elapsed() > max_age {
                return None;
            }
        }

        Some(&entry.packet)
    }
}
