use std::collections::VecDeque;
use std::num::NonZeroUsize;

use crate::error::ConfigError;

/// Anything that carries a millisecond timestamp can live in a `SampleWindow`.
pub trait Timestamped {
    fn timestamp_ms(&self) -> u64;
}

/// Eviction policy for a `SampleWindow`. One bound per window instance.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WindowBound {
    /// Keep at most this many elements.
    Count(usize),
    /// Keep only elements no older than this many milliseconds relative to
    /// the newest element.
    Age(u64),
}

#[derive(Clone, Copy, Debug)]
enum Bound {
    Count(NonZeroUsize),
    Age(u64),
}

/// Bounded, time-ordered buffer. Insertion at the tail, eviction from the head.
#[derive(Clone, Debug)]
pub struct SampleWindow<T> {
    items: VecDeque<T>,
    bound: Bound,
}

impl<T: Timestamped> SampleWindow<T> {
    pub fn new(bound: WindowBound) -> Result<Self, ConfigError> {
        let (bound, reserve) = match bound {
            WindowBound::Count(n) => {
                let n = NonZeroUsize::new(n).ok_or(ConfigError::ZeroCapacity)?;
                (Bound::Count(n), n.get())
            }
            WindowBound::Age(0) => return Err(ConfigError::ZeroAge),
            WindowBound::Age(ms) => (Bound::Age(ms), 0),
        };
        Ok(Self {
            items: VecDeque::with_capacity(reserve),
            bound,
        })
    }

    pub fn with_capacity(capacity: usize) -> Result<Self, ConfigError> {
        Self::new(WindowBound::Count(capacity))
    }

    /// Append at the tail and evict from the head until the bound holds.
    /// Timestamps must be non-decreasing across pushes.
    pub fn push(&mut self, item: T) {
        debug_assert!(
            self.items
                .back()
                .map_or(true, |last| last.timestamp_ms() <= item.timestamp_ms()),
            "sample window timestamps must be non-decreasing"
        );
        self.items.push_back(item);

        match self.bound {
            Bound::Count(cap) => {
                while self.items.len() > cap.get() {
                    self.items.pop_front();
                }
            }
            Bound::Age(max_age) => {
                let newest = self.items.back().map_or(0, |i| i.timestamp_ms());
                let cutoff = newest.saturating_sub(max_age);
                while self
                    .items
                    .front()
                    .map_or(false, |i| i.timestamp_ms() < cutoff)
                {
                    self.items.pop_front();
                }
            }
        }
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.items.iter()
    }

    pub fn latest(&self) -> Option<&T> {
        self.items.back()
    }

    /// Contiguous read-only view in push order.
    ///
    /// Takes `&mut self` only to let the deque rotate its storage; the logical
    /// contents are untouched.
    pub fn as_slice(&mut self) -> &[T] {
        self.items.make_contiguous()
    }
}

impl<T: Timestamped + Clone> SampleWindow<T> {
    /// Owned snapshot in push order.
    pub fn to_vec(&self) -> Vec<T> {
        self.items.iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, Debug, PartialEq)]
    struct Tick(u64);

    impl Timestamped for Tick {
        fn timestamp_ms(&self) -> u64 {
            self.0
        }
    }

    #[test]
    fn keeps_last_capacity_items_in_order() {
        for n in [0usize, 1, 119, 120, 121, 500] {
            let mut window = SampleWindow::with_capacity(120).unwrap();
            for i in 0..n as u64 {
                window.push(Tick(i));
            }
            assert_eq!(window.len(), n.min(120));
            let expected: Vec<Tick> = (n.saturating_sub(120) as u64..n as u64).map(Tick).collect();
            assert_eq!(window.to_vec(), expected);
        }
    }

    #[test]
    fn zero_capacity_is_rejected_at_construction() {
        let err = SampleWindow::<Tick>::with_capacity(0).unwrap_err();
        assert_eq!(err, ConfigError::ZeroCapacity);
        let err = SampleWindow::<Tick>::new(WindowBound::Age(0)).unwrap_err();
        assert_eq!(err, ConfigError::ZeroAge);
    }

    #[test]
    fn age_bound_evicts_old_items() {
        let mut window = SampleWindow::new(WindowBound::Age(60_000)).unwrap();
        for s in 0..=90u64 {
            window.push(Tick(s * 1000));
        }
        assert_eq!(window.iter().next(), Some(&Tick(30_000)));
        assert_eq!(window.latest(), Some(&Tick(90_000)));
        assert_eq!(window.len(), 61);
    }

    #[test]
    fn clear_empties_window() {
        let mut window = SampleWindow::with_capacity(4).unwrap();
        window.push(Tick(1));
        window.push(Tick(2));
        window.clear();
        assert!(window.is_empty());
        assert_eq!(window.latest(), None);
    }

    #[test]
    fn slice_view_survives_wraparound() {
        let mut window = SampleWindow::with_capacity(3).unwrap();
        for i in 0..7 {
            window.push(Tick(i));
        }
        assert_eq!(window.as_slice(), &[Tick(4), Tick(5), Tick(6)]);
        assert_eq!(window.len(), 3);
    }
}
