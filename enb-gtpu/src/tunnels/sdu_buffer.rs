use crate::BufferOverflowPolicy;
use std::collections::VecDeque;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferedSdu {
    pub pdcp_sn: Option<u16>,
    pub sdu: Vec<u8>,
}

/// Bounded FIFO of SDUs held by a tunnel while it is buffering.
#[derive(Debug)]
pub struct SduBuffer {
    queue: VecDeque<BufferedSdu>,
    capacity: usize,
    policy: BufferOverflowPolicy,
    dropped: u64,
}

pub enum PushOutcome {
    Queued,
    EvictedOldest(BufferedSdu),
    Rejected(BufferedSdu),
}

impl SduBuffer {
    pub fn new(capacity: usize, policy: BufferOverflowPolicy) -> Self {
        SduBuffer {
            queue: VecDeque::new(),
            capacity,
            policy,
            dropped: 0,
        }
    }

    pub fn push(&mut self, sdu: BufferedSdu) -> PushOutcome {
        if self.queue.len() < self.capacity {
            self.queue.push_back(sdu);
            return PushOutcome::Queued;
        }
        self.dropped += 1;
        match self.policy {
            BufferOverflowPolicy::RejectNew => PushOutcome::Rejected(sdu),
            BufferOverflowPolicy::DropOldest => {
                // Capacity is at least 1, so there is an oldest entry.
                let oldest = self.queue.pop_front();
                self.queue.push_back(sdu);
                oldest.map_or(PushOutcome::Queued, PushOutcome::EvictedOldest)
            }
        }
    }

    /// Remove all SDUs, oldest first.
    pub fn drain(&mut self) -> Vec<BufferedSdu> {
        self.queue.drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Number of SDUs lost to overflow over the lifetime of the buffer.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}
