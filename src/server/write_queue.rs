use std::collections::VecDeque;

use bytes::Bytes;

/// Pending output for one connection.
///
/// The queue itself is not synchronized; the connection keeps it behind its
/// state mutex. It enforces the single-writer rule: [`submit`] hands a buffer
/// back only when nothing is in flight, and [`complete`] hands back the next
/// buffer only after the previous write finished.
///
/// [`submit`]: WriteQueue::submit
/// [`complete`]: WriteQueue::complete
#[derive(Debug, Default)]
pub struct WriteQueue {
    pending: VecDeque<Bytes>,
    in_flight: bool,
}

impl WriteQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the buffer if the caller must write it now, or parks it
    /// behind the write that is already in flight.
    pub fn submit(&mut self, buf: Bytes) -> Option<Bytes> {
        if self.in_flight {
            self.pending.push_back(buf);
            None
        } else {
            self.in_flight = true;
            Some(buf)
        }
    }

    /// Parks `buf` without issuing it, for a transport that cannot write yet.
    pub fn defer(&mut self, buf: Bytes) {
        self.pending.push_back(buf);
    }

    /// Returns the first parked buffer once writing becomes possible, unless
    /// a write is already in flight.
    pub fn resume(&mut self) -> Option<Bytes> {
        if self.in_flight {
            return None;
        }
        let next = self.pending.pop_front()?;
        self.in_flight = true;
        Some(next)
    }

    /// Marks the in-flight write finished and returns the next buffer to
    /// write, if any. The write stays in flight when one is returned.
    pub fn complete(&mut self) -> Option<Bytes> {
        match self.pending.pop_front() {
            Some(next) => {
                self.in_flight = true;
                Some(next)
            }
            None => {
                self.in_flight = false;
                None
            }
        }
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight
    }

    /// Number of buffers waiting behind the in-flight write.
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Drops everything still waiting. The in-flight write, if any, is
    /// unaffected.
    pub fn clear(&mut self) {
        self.pending.clear();
    }
}
