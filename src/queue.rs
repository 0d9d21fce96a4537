/*!
    Bounded packet queue between the source and a decoder stage.
*/

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::{Condvar, Mutex};
use tracing::{debug, info, warn};

use media_types::Packet;

/**
    A bounded single-producer/single-consumer packet queue.

    The producer never blocks: when a push exceeds the capacity, the
    oldest data packets are dropped down to half capacity and the queue
    enters drop mode. While in drop mode the consumer discards non-key
    packets without decoding; the mode clears once the depth falls below a
    quarter of capacity. End-of-stream sentinels are never dropped.
*/
pub struct PacketQueue {
    inner: Mutex<Inner>,
    available: Condvar,
    capacity: usize,
    overflow_drops: AtomicU64,
    drop_mode_transitions: AtomicU64,
}

struct Inner {
    packets: VecDeque<Packet>,
    drop_mode: bool,
    closed: bool,
}

impl PacketQueue {
    /**
        Create a queue with the given capacity.
    */
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                packets: VecDeque::with_capacity(capacity),
                drop_mode: false,
                closed: false,
            }),
            available: Condvar::new(),
            capacity,
            overflow_drops: AtomicU64::new(0),
            drop_mode_transitions: AtomicU64::new(0),
        }
    }

    /**
        Enqueue a packet, shedding the oldest data packets on overflow.

        Packets pushed after `close()` are discarded.
    */
    pub fn push(&self, packet: Packet) {
        let mut inner = self.inner.lock();
        if inner.closed {
            return;
        }

        inner.packets.push_back(packet);

        if inner.packets.len() > self.capacity {
            let target = self.capacity / 2;
            let mut dropped = 0u64;

            while inner.packets.len() > target {
                // shed from the front, skipping EOS sentinels
                let Some(position) = inner.packets.iter().position(|p| !p.is_eos()) else {
                    break;
                };
                let _ = inner.packets.remove(position);
                dropped += 1;
            }

            if dropped > 0 {
                self.overflow_drops.fetch_add(dropped, Ordering::Relaxed);
                if !inner.drop_mode {
                    inner.drop_mode = true;
                    self.drop_mode_transitions.fetch_add(1, Ordering::Relaxed);
                    warn!(dropped, "packet queue overflow, entering drop mode");
                } else {
                    debug!(dropped, "packet queue overflow while in drop mode");
                }
            }
        }

        self.available.notify_one();
    }

    /**
        Dequeue the next packet, waiting up to `timeout` for one to arrive.

        Returns `None` on timeout or when the queue is closed and empty.
    */
    pub fn pop(&self, timeout: Duration) -> Option<Packet> {
        let mut inner = self.inner.lock();

        if inner.packets.is_empty() && !inner.closed {
            let _ = self.available.wait_for(&mut inner, timeout);
        }

        let packet = inner.packets.pop_front();

        if inner.drop_mode && inner.packets.len() < self.capacity / 4 {
            inner.drop_mode = false;
            info!("packet queue drained, leaving drop mode");
        }

        packet
    }

    /**
        Whether the consumer should discard non-key packets.
    */
    pub fn in_drop_mode(&self) -> bool {
        self.inner.lock().drop_mode
    }

    /**
        Close the queue, waking any waiting consumer. Further pushes are
        discarded; queued packets remain poppable.
    */
    pub fn close(&self) {
        self.inner.lock().closed = true;
        self.available.notify_all();
    }

    /**
        Discard all queued packets.
    */
    pub fn clear(&self) {
        self.inner.lock().packets.clear();
    }

    pub fn len(&self) -> usize {
        self.inner.lock().packets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Total packets shed by overflow so far.
    pub fn overflow_drops(&self) -> u64 {
        self.overflow_drops.load(Ordering::Relaxed)
    }

    /// Number of transitions into drop mode (one warning each).
    pub fn drop_mode_transitions(&self) -> u64 {
        self.drop_mode_transitions.load(Ordering::Relaxed)
    }
}

// Shared between the source thread and one decoder thread.
static_assertions::assert_impl_all!(PacketQueue: Send, Sync);
