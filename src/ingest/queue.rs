// SPDX-License-Identifier: MIT
// © 2025–2026 Christopher Liu

//! Bounded single-producer / single-consumer queue shared between an interrupt handler and the
//! main loop.
//!
//! The producer side ([`IngestQueue::enqueue`]) runs in interrupt context: it never blocks and
//! never allocates. An item that would exceed the slot count or the byte ceiling is dropped and
//! counted. The consumer side ([`IngestQueue::drain_all`]) runs in the main loop: each item is
//! unlinked inside a critical section and handed to the visitor by value after the critical
//! section has ended, so visitor code always runs with interrupts enabled.

use core::cell::RefCell;

use critical_section::Mutex;
use heapless::Deque;

use crate::error::{Error, Result};

/// Item stored in an [`IngestQueue`].
pub trait QueueItem {
    /// Bytes charged against the queue ceiling while the item is queued.
    fn footprint(&self) -> usize;

    /// Admission check run before the item is linked.
    fn validate(&self) -> Result<()> {
        Ok(())
    }
}

/// Counters exposed for diagnostics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueStats {
    /// Items currently queued.
    pub waiting: usize,
    /// Bytes currently charged against the ceiling.
    pub bytes: usize,
    /// Items rejected because the queue was full.
    pub dropped: u32,
    /// Items rejected by [`QueueItem::validate`].
    pub malformed: u32,
    /// Items removed as duplicates of an earlier item.
    pub purged: u32,
}

struct Inner<T, const N: usize> {
    items: Deque<T, N>,
    bytes: usize,
    dropped: u32,
    malformed: u32,
    purged: u32,
}

/// Interrupt-safe FIFO with a slot count `N` and a byte ceiling.
pub struct IngestQueue<T, const N: usize> {
    inner: Mutex<RefCell<Inner<T, N>>>,
    ceiling: usize,
}

impl<T: QueueItem, const N: usize> IngestQueue<T, N> {
    /// Create an empty queue. Usable in a `static`.
    pub const fn new(ceiling: usize) -> Self {
        Self {
            inner: Mutex::new(RefCell::new(Inner {
                items: Deque::new(),
                bytes: 0,
                dropped: 0,
                malformed: 0,
                purged: 0,
            })),
            ceiling,
        }
    }

    /// Byte ceiling of this queue.
    #[inline]
    pub fn ceiling(&self) -> usize {
        self.ceiling
    }

    /// Link `item` at the tail. Safe to call from interrupt context.
    ///
    /// On failure the item is discarded and the matching counter incremented.
    pub fn enqueue(&self, item: T) -> Result<()> {
        critical_section::with(|cs| {
            let mut inner = self.inner.borrow_ref_mut(cs);

            if let Err(e) = item.validate() {
                inner.malformed = inner.malformed.wrapping_add(1);
                return Err(e);
            }

            let cost = item.footprint();
            if inner.bytes + cost > self.ceiling {
                inner.dropped = inner.dropped.wrapping_add(1);
                return Err(Error::QueueFull);
            }

            match inner.items.push_back(item) {
                Ok(()) => {
                    inner.bytes += cost;
                    Ok(())
                }
                Err(_) => {
                    inner.dropped = inner.dropped.wrapping_add(1);
                    Err(Error::QueueFull)
                }
            }
        })
    }

    /// Pop items in FIFO order and hand each to `visitor`. Main loop only.
    ///
    /// At most the number of items queued at entry are delivered; anything the producer adds while
    /// the visitor runs waits for the next call. Returns the number of items delivered.
    pub fn drain_all<F: FnMut(T)>(&self, visitor: F) -> usize {
        self.drain_purging(|_, _| false, visitor)
    }

    /// Like [`drain_all`](Self::drain_all), but before each popped item is delivered every later
    /// item for which `is_duplicate(popped, later)` holds is unlinked and released. The predicate
    /// may update the popped item, e.g. to count the copies it absorbed.
    pub fn drain_purging<P, F>(&self, mut is_duplicate: P, mut visitor: F) -> usize
    where
        P: FnMut(&mut T, &T) -> bool,
        F: FnMut(T),
    {
        let budget = self.len();
        let mut delivered = 0;

        while delivered < budget {
            let popped = critical_section::with(|cs| {
                let mut inner = self.inner.borrow_ref_mut(cs);
                let mut head = inner.items.pop_front()?;
                inner.bytes -= head.footprint();

                let rest = inner.items.len();
                for _ in 0..rest {
                    let Some(other) = inner.items.pop_front() else {
                        break;
                    };
                    if is_duplicate(&mut head, &other) {
                        inner.bytes -= other.footprint();
                        inner.purged = inner.purged.wrapping_add(1);
                    } else {
                        // Slot freed by the pop above.
                        let _ = inner.items.push_back(other);
                    }
                }
                Some(head)
            });

            match popped {
                Some(item) => {
                    visitor(item);
                    delivered += 1;
                }
                None => break,
            }
        }

        delivered
    }

    /// Release every queued item without delivering it.
    pub fn clear(&self) {
        critical_section::with(|cs| {
            let mut inner = self.inner.borrow_ref_mut(cs);
            inner.items.clear();
            inner.bytes = 0;
        });
    }

    #[inline]
    pub fn len(&self) -> usize {
        critical_section::with(|cs| self.inner.borrow_ref(cs).items.len())
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Items rejected at admission for lack of space.
    #[inline]
    pub fn dropped(&self) -> u32 {
        critical_section::with(|cs| self.inner.borrow_ref(cs).dropped)
    }

    /// Snapshot of all counters.
    pub fn stats(&self) -> QueueStats {
        critical_section::with(|cs| {
            let inner = self.inner.borrow_ref(cs);
            QueueStats {
                waiting: inner.items.len(),
                bytes: inner.bytes,
                dropped: inner.dropped,
                malformed: inner.malformed,
                purged: inner.purged,
            }
        })
    }
}
