use std::cmp::Ordering;

use dsys_runtime::Message;

/// A hold-back queue entry, ordered so a [`std::collections::BinaryHeap`] pops the
/// *smallest* sequence number first (spec §4.2, §9: "a small binary heap per source").
pub struct Entry {
    pub seq_no: u64,
    pub message: Message,
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.seq_no == other.seq_no
    }
}

impl Eq for Entry {}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Entry {
    fn cmp(&self, other: &Self) -> Ordering {
        other.seq_no.cmp(&self.seq_no)
    }
}
