//! Per-connection identity.
//!
//! Every WebSocket connection gets a [`ClientId`] the moment it is accepted.
//! The id is only used to address replies and to correlate log lines; it is
//! never reused while the process runs.
//!
//! # Thread safety
//!
//! The accept loop hands out ids, and it may be joined by other tasks in the
//! future, so the allocator is an `AtomicU64` rather than a plain counter.
//! `fetch_add` reads and increments in one indivisible step, so two callers
//! can never receive the same id.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Opaque connection identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClientId(pub u64);

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "client-{}", self.0)
    }
}

/// Hands out monotonically increasing [`ClientId`]s, starting at 1.
///
/// # Examples
///
/// ```rust
/// use z21_web_bridge::domain::{ClientId, ClientIdAllocator};
///
/// let ids = ClientIdAllocator::new();
/// assert_eq!(ids.next(), ClientId(1));
/// assert_eq!(ids.next(), ClientId(2));
/// ```
#[derive(Debug)]
pub struct ClientIdAllocator {
    next: AtomicU64,
}

impl ClientIdAllocator {
    pub fn new() -> Self {
        Self { next: AtomicU64::new(1) }
    }

    /// Returns a fresh id.
    ///
    /// `Ordering::Relaxed` is enough: ids only need to be unique, they do not
    /// publish any other memory.
    pub fn next(&self) -> ClientId {
        ClientId(self.next.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for ClientIdAllocator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_first_id_is_one() {
        // Arrange
        let ids = ClientIdAllocator::new();

        // Act
        let first = ids.next();

        // Assert
        assert_eq!(first, ClientId(1));
    }

    #[test]
    fn test_ids_are_unique_across_threads() {
        // Arrange
        let ids = Arc::new(ClientIdAllocator::new());

        // Act
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let ids = Arc::clone(&ids);
                thread::spawn(move || (0..250).map(|_| ids.next()).collect::<Vec<_>>())
            })
            .collect();
        let mut all: Vec<ClientId> = handles
            .into_iter()
            .flat_map(|h| h.join().expect("thread panicked"))
            .collect();

        // Assert
        all.sort_unstable();
        all.dedup();
        assert_eq!(all.len(), 1000, "every id must be unique");
    }

    #[test]
    fn test_display_is_log_friendly() {
        assert_eq!(ClientId(7).to_string(), "client-7");
    }
}
