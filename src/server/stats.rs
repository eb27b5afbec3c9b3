use std::sync::atomic::{AtomicU64, Ordering};

/// Per-connection counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConnectionStats {
    /// Reads handed to the transport.
    pub reads_issued: u64,

    /// Writes handed to the transport.
    pub writes_issued: u64,

    pub bytes_read: u64,

    pub bytes_written: u64,

    /// Liveness probes sent after an idle WebSocket period.
    pub probes_sent: u64,

    /// Times the idle timer was armed.
    pub timer_arms: u64,
}

/// Atomic connection statistics.
#[derive(Debug, Default)]
pub struct AtomicConnectionStats {
    reads_issued: AtomicU64,
    writes_issued: AtomicU64,
    bytes_read: AtomicU64,
    bytes_written: AtomicU64,
    probes_sent: AtomicU64,
    timer_arms: AtomicU64,
}

impl AtomicConnectionStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_read_issued(&self) {
        self.reads_issued.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_write_issued(&self) {
        self.writes_issued.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_bytes_read(&self, bytes: u64) {
        self.bytes_read.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn record_bytes_written(&self, bytes: u64) {
        self.bytes_written.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn record_probe(&self) {
        self.probes_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_timer_armed(&self) {
        self.timer_arms.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> ConnectionStats {
        ConnectionStats {
            reads_issued: self.reads_issued.load(Ordering::Relaxed),
            writes_issued: self.writes_issued.load(Ordering::Relaxed),
            bytes_read: self.bytes_read.load(Ordering::Relaxed),
            bytes_written: self.bytes_written.load(Ordering::Relaxed),
            probes_sent: self.probes_sent.load(Ordering::Relaxed),
            timer_arms: self.timer_arms.load(Ordering::Relaxed),
        }
    }
}
