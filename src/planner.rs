// src/planner.rs

use crate::models::ByteRange;

/// A sequence that can be cut into consecutive pieces from the front.
pub trait Splittable: Sized {
    fn split_len(&self) -> u64;

    /// Removes and returns the first `n` elements. `n` never exceeds `split_len`.
    fn take_front(&mut self, n: u64) -> Self;
}

impl<T> Splittable for Vec<T> {
    fn split_len(&self) -> u64 {
        self.len() as u64
    }

    fn take_front(&mut self, n: u64) -> Self {
        let rest = self.split_off(n as usize);
        std::mem::replace(self, rest)
    }
}

impl Splittable for ByteRange {
    fn split_len(&self) -> u64 {
        self.len
    }

    fn take_front(&mut self, n: u64) -> Self {
        let front = ByteRange {
            start: self.start,
            len: n,
        };
        self.start += n;
        self.len -= n;
        front
    }
}

/// How part sizes are chosen when a length does not divide evenly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layout {
    /// Part `i` gets `floor((i+1)·L/n) − floor(i·L/n)`; sizes differ by at most one.
    Balanced,
    /// Every part gets `L / n`, the last one also takes the remainder.
    RemainderLast,
}

impl Layout {
    fn part_len(self, total: u64, n: usize, i: usize) -> u64 {
        let (total, n, i) = (total as u128, n as u128, i as u128);
        let len = match self {
            Layout::Balanced => (i + 1) * total / n - i * total / n,
            Layout::RemainderLast => {
                let step = total / n;
                if i + 1 == n {
                    total - i * step
                } else {
                    step
                }
            }
        };
        len as u64
    }
}

/// Cuts `seq` into exactly `n` consecutive parts whose concatenation is `seq`.
/// Returns no parts when `n` is zero.
pub fn split_into<S: Splittable>(mut seq: S, n: usize, layout: Layout) -> Vec<S> {
    if n == 0 {
        return Vec::new();
    }
    let total = seq.split_len();
    (0..n)
        .map(|i| seq.take_front(layout.part_len(total, n, i)))
        .collect()
}

/// Byte ranges tiling `[0, total_size)` for `workers` concurrent chunks.
pub fn plan_chunks(total_size: u64, workers: usize) -> Vec<ByteRange> {
    let whole = ByteRange {
        start: 0,
        len: total_size,
    };
    split_into(whole, workers, Layout::RemainderLast)
}

/// Splits whole-file work into `workers` order-preserving batches.
pub fn distribute_batches<T>(items: Vec<T>, workers: usize) -> Vec<Vec<T>> {
    split_into(items, workers, Layout::Balanced)
}
