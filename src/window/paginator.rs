//! Pagination policy for newest-first feeds

/// Decision for one fetched item
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Keep the item and continue paging
    Take,
    /// Drop the item and stop paging
    Stop,
}

/// Decides how far a newest-first feed is paged
///
/// Paging stops at the first item older than the cutoff or once `limit`
/// items have been taken. Items without a timestamp are taken.
#[derive(Debug, Clone)]
pub struct Paginator {
    cutoff: Option<i64>,
    limit: Option<usize>,
    taken: usize,
}

impl Paginator {
    pub fn new(cutoff: Option<i64>, limit: Option<usize>) -> Self {
        Self {
            cutoff,
            limit,
            taken: 0,
        }
    }

    pub fn admit(&mut self, timestamp: Option<i64>) -> Admission {
        if self.limit.is_some_and(|limit| self.taken >= limit) {
            return Admission::Stop;
        }
        if let (Some(cutoff), Some(ts)) = (self.cutoff, timestamp) {
            if ts < cutoff {
                return Admission::Stop;
            }
        }
        self.taken += 1;
        Admission::Take
    }

    /// Number of items admitted so far
    pub fn taken(&self) -> usize {
        self.taken
    }
}
