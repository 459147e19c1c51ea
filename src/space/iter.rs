//! Lazy Cartesian-product enumeration (odometer order)

use super::{ConfigSpace, Configuration};

/// Iterator over every configuration of a [`ConfigSpace`].
///
/// Keeps one index per parameter and advances them like an odometer: the
/// last-declared parameter turns fastest. Nothing is materialized up front,
/// so arbitrarily large spaces can be streamed into a worker queue.
#[derive(Debug, Clone)]
pub struct ConfigIter {
    space: ConfigSpace,
    cursor: Vec<usize>,
    remaining: usize,
}

impl ConfigIter {
    pub(super) fn new(space: ConfigSpace) -> Self {
        let remaining = space.len();
        let cursor = vec![0; space.params().len()];
        Self {
            space,
            cursor,
            remaining,
        }
    }

    fn advance(&mut self) {
        for (slot, param) in self.cursor.iter_mut().zip(self.space.params()).rev() {
            *slot += 1;
            if *slot < param.values().len() {
                return;
            }
            *slot = 0;
        }
    }
}

impl Iterator for ConfigIter {
    type Item = Configuration;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }

        let values = self
            .cursor
            .iter()
            .zip(self.space.params())
            .map(|(&i, p)| p.values()[i].clone())
            .collect();
        let config = Configuration::new(self.space.shared_names(), values);

        self.remaining -= 1;
        self.advance();
        Some(config)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl ExactSizeIterator for ConfigIter {}

impl std::iter::FusedIterator for ConfigIter {}
