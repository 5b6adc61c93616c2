//! In-memory append buffer for log entries awaiting upload.
//!
//! Guarantees:
//! - `append` assigns strictly monotonic offsets and never blocks beyond the
//!   internal lock; no I/O on the caller's path.
//! - `drain` removes entries atomically in arrival order; an entry is never
//!   both drained and left behind.
//! - A configured hard ceiling is enforced by policy: drop-oldest evicts and
//!   keeps accepting, reject-new fails the append.

use std::collections::VecDeque;
use std::sync::Mutex;

use crate::entry::{EntryContent, LogEntry};
use crate::error::BufferError;

/// What to do when the hard memory ceiling is exceeded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OverflowPolicy {
    /// Evict oldest unflushed entries to make room (lossy, logged).
    DropOldest,
    /// Refuse the new entry with `BufferError::Overflow`.
    #[default]
    RejectNew,
}

impl std::str::FromStr for OverflowPolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "drop-oldest" => Ok(Self::DropOldest),
            "reject-new" => Ok(Self::RejectNew),
            other => Err(format!("unknown overflow policy: {other}")),
        }
    }
}

#[derive(Debug, Default)]
struct Inner {
    entries: VecDeque<LogEntry>,
    pending_bytes: usize,
    next_offset: u64,
}

/// Thread-safe holding area between producers and the batch builder.
#[derive(Debug)]
pub struct LogBuffer {
    inner: Mutex<Inner>,
    /// Hard ceiling on pending bytes; `None` = unbounded.
    max_buffer_bytes: Option<usize>,
    policy: OverflowPolicy,
}

impl LogBuffer {
    pub fn new(max_buffer_bytes: Option<usize>, policy: OverflowPolicy) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            max_buffer_bytes,
            policy,
        }
    }

    /// Unbounded buffer, used in tests and by default.
    pub fn unbounded() -> Self {
        Self::new(None, OverflowPolicy::default())
    }

    /// Append one reasoning step, returning its assigned offset.
    pub fn append(
        &self,
        agent_id: &str,
        step_index: u64,
        content: EntryContent,
    ) -> std::result::Result<u64, BufferError> {
        let mut inner = self.inner.lock().unwrap();
        let entry = LogEntry::new(inner.next_offset, agent_id, step_index, content);
        let entry_bytes = entry.size_bytes;

        if let Some(max) = self.max_buffer_bytes {
            if inner.pending_bytes + entry_bytes > max {
                match self.policy {
                    OverflowPolicy::RejectNew => {
                        return Err(BufferError::Overflow {
                            pending_bytes: inner.pending_bytes + entry_bytes,
                            max_bytes: max,
                        });
                    }
                    OverflowPolicy::DropOldest => {
                        let mut dropped = 0usize;
                        while inner.pending_bytes + entry_bytes > max {
                            match inner.entries.pop_front() {
                                Some(old) => {
                                    inner.pending_bytes -= old.size_bytes;
                                    dropped += 1;
                                }
                                None => break, // single entry larger than the ceiling
                            }
                        }
                        if dropped > 0 {
                            crate::obs::emit_entries_dropped(dropped, inner.pending_bytes);
                        }
                    }
                }
            }
        }

        let offset = entry.offset;
        inner.pending_bytes += entry_bytes;
        inner.entries.push_back(entry);
        inner.next_offset += 1;
        Ok(offset)
    }

    /// Atomically remove and return entries from the front, up to `max_bytes`.
    ///
    /// An oversized head entry is still returned (alone) so it can be sealed
    /// into its own batch; entries are never split.
    pub fn drain(&self, max_bytes: usize) -> Vec<LogEntry> {
        let mut inner = self.inner.lock().unwrap();
        let mut drained = Vec::new();
        let mut drained_bytes = 0usize;

        while let Some(front) = inner.entries.front() {
            if !drained.is_empty() && drained_bytes + front.size_bytes > max_bytes {
                break;
            }
            let entry = inner.entries.pop_front().unwrap();
            inner.pending_bytes -= entry.size_bytes;
            drained_bytes += entry.size_bytes;
            drained.push(entry);
        }

        drained
    }

    /// Atomically remove and return everything pending.
    pub fn drain_all(&self) -> Vec<LogEntry> {
        self.drain(usize::MAX)
    }

    /// Bytes currently pending upload.
    pub fn pending_bytes(&self) -> usize {
        self.inner.lock().unwrap().pending_bytes
    }

    /// Entries currently pending upload.
    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Offset that the next appended entry will receive.
    pub fn next_offset(&self) -> u64 {
        self.inner.lock().unwrap().next_offset
    }

    /// Fast-forward the next offset so a restarted stream continues past a
    /// durable cursor instead of reissuing offsets the cursor already
    /// covers. Never moves backwards.
    pub fn resume_from(&self, next_offset: u64) {
        let mut inner = self.inner.lock().unwrap();
        if next_offset > inner.next_offset {
            inner.next_offset = next_offset;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn text(n: usize) -> EntryContent {
        EntryContent::Text("x".repeat(n))
    }

    #[test]
    fn test_append_assigns_monotonic_offsets() {
        let buf = LogBuffer::unbounded();
        assert_eq!(buf.append("a", 0, text(10)).unwrap(), 0);
        assert_eq!(buf.append("a", 1, text(10)).unwrap(), 1);
        assert_eq!(buf.append("b", 0, text(10)).unwrap(), 2);
        assert_eq!(buf.next_offset(), 3);
    }

    #[test]
    fn test_drain_preserves_order() {
        let buf = LogBuffer::unbounded();
        for i in 0..5 {
            buf.append("a", i, text(10)).unwrap();
        }
        let drained = buf.drain_all();
        let offsets: Vec<u64> = drained.iter().map(|e| e.offset).collect();
        assert_eq!(offsets, vec![0, 1, 2, 3, 4]);
        assert!(buf.is_empty());
        assert_eq!(buf.pending_bytes(), 0);
    }

    #[test]
    fn test_drain_respects_max_bytes() {
        let buf = LogBuffer::unbounded();
        for i in 0..4 {
            buf.append("a", i, text(100)).unwrap();
        }
        let drained = buf.drain(250);
        assert_eq!(drained.len(), 2);
        assert_eq!(buf.len(), 2);
    }

    #[test]
    fn test_drain_oversized_head_returned_alone() {
        let buf = LogBuffer::unbounded();
        buf.append("a", 0, text(5000)).unwrap();
        buf.append("a", 1, text(10)).unwrap();
        let drained = buf.drain(1024);
        assert_eq!(drained.len(), 1);
        assert_eq!(drained[0].size_bytes, 5000);
    }

    #[test]
    fn test_reject_new_overflow() {
        let buf = LogBuffer::new(Some(100), OverflowPolicy::RejectNew);
        buf.append("a", 0, text(80)).unwrap();
        let err = buf.append("a", 1, text(80)).unwrap_err();
        assert!(matches!(err, BufferError::Overflow { .. }));
        // First entry untouched.
        assert_eq!(buf.len(), 1);
    }

    #[test]
    fn test_drop_oldest_overflow() {
        let buf = LogBuffer::new(Some(100), OverflowPolicy::DropOldest);
        buf.append("a", 0, text(60)).unwrap();
        buf.append("a", 1, text(60)).unwrap();
        // Oldest evicted; newest kept.
        assert_eq!(buf.len(), 1);
        assert_eq!(buf.drain_all()[0].step_index, 1);
    }

    #[test]
    fn test_offsets_survive_drop_oldest() {
        let buf = LogBuffer::new(Some(100), OverflowPolicy::DropOldest);
        buf.append("a", 0, text(60)).unwrap();
        let off = buf.append("a", 1, text(60)).unwrap();
        // Offsets keep advancing even when entries are evicted.
        assert_eq!(off, 1);
        assert_eq!(buf.next_offset(), 2);
    }

    #[test]
    fn test_concurrent_appends_no_loss() {
        let buf = Arc::new(LogBuffer::unbounded());
        let mut handles = Vec::new();
        for t in 0..8 {
            let buf = Arc::clone(&buf);
            handles.push(std::thread::spawn(move || {
                for i in 0..100 {
                    buf.append(&format!("agent-{t}"), i, EntryContent::Text(format!("{t}:{i}")))
                        .unwrap();
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
        let drained = buf.drain_all();
        assert_eq!(drained.len(), 800);
        // Offsets are a permutation-free, contiguous range.
        let mut offsets: Vec<u64> = drained.iter().map(|e| e.offset).collect();
        offsets.sort_unstable();
        assert_eq!(offsets, (0..800).collect::<Vec<u64>>());
        // Per-agent relative order preserved.
        let steps: Vec<u64> = drained
            .iter()
            .filter(|e| e.agent_id == "agent-3")
            .map(|e| e.step_index)
            .collect();
        assert_eq!(steps, (0..100).collect::<Vec<u64>>());
    }

    #[test]
    fn test_resume_from_fast_forwards_offsets() {
        let buf = LogBuffer::unbounded();
        buf.resume_from(5);
        assert_eq!(buf.append("a", 0, text(10)).unwrap(), 5);
        // Never moves backwards.
        buf.resume_from(2);
        assert_eq!(buf.next_offset(), 6);
    }

    #[test]
    fn test_overflow_policy_parse() {
        assert_eq!("drop-oldest".parse::<OverflowPolicy>().unwrap(), OverflowPolicy::DropOldest);
        assert_eq!("reject-new".parse::<OverflowPolicy>().unwrap(), OverflowPolicy::RejectNew);
        assert!("nope".parse::<OverflowPolicy>().is_err());
    }
}
