//! 📦 Batcher: fills a box, ships the box, gets a new box.
//!
//! A pure sequencing primitive. It knows nothing about indexes, sinks, or HTTP.
//! It counts to `max_size`, hands back a full batch, and starts over. At the end
//! of an object, [`Batcher::flush`] hands back whatever is left, possibly nothing.
//! One batcher per object, so a batch never straddles two files.

use tracing::trace;

/// 📦 Accumulates items into batches of exactly `max_size`, except the last.
#[derive(Debug)]
pub struct Batcher<T> {
    max_size: usize,
    in_flight: Vec<T>,
}

impl<T> Batcher<T> {
    /// 🏗️ A batcher for batches of `max_size`. Zero is treated as one; config
    /// validation should have caught it long before we got here.
    pub fn new(max_size: usize) -> Self {
        let max_size = max_size.max(1);
        Self {
            max_size,
            in_flight: Vec::with_capacity(max_size),
        }
    }

    /// ➕ Add one item. Returns the completed batch when this item filled it.
    pub fn accumulate(&mut self, item: T) -> Option<Vec<T>> {
        self.in_flight.push(item);
        if self.in_flight.len() >= self.max_size {
            trace!("📦 batch of {} is full, shipping it", self.max_size);
            Some(std::mem::replace(
                &mut self.in_flight,
                Vec::with_capacity(self.max_size),
            ))
        } else {
            None
        }
    }

    /// 🗑️ Hand back whatever is in flight, even if that's nothing. Callers that
    /// care (they all do) check `is_empty()` before submitting.
    pub fn flush(&mut self) -> Vec<T> {
        std::mem::take(&mut self.in_flight)
    }

    /// 🔢 Items waiting in the current batch.
    pub fn pending(&self) -> usize {
        self.in_flight.len()
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }
}
