use crate::{Error, Memo};
use num::bigint::BigInt;
use num::traits::One;

/// Exact factorials, memoized for every `n` below a fixed limit.
#[derive(Clone, Debug)]
pub struct FactorialCache {
    memo: Memo<usize, BigInt>,
    limit: usize,
}

impl FactorialCache {
    pub fn new(limit: usize) -> Self {
        Self {
            memo: Memo::default(),
            limit,
        }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn len(&self) -> usize {
        self.memo.len()
    }

    pub fn is_empty(&self) -> bool {
        self.memo.is_empty()
    }

    pub fn hits(&self) -> u32 {
        self.memo.hits()
    }

    pub fn factorial(&mut self, n: usize) -> Result<BigInt, Error> {
        if n >= self.limit {
            return Err(Error::OutOfRange {
                value: n,
                limit: self.limit,
            });
        }
        let below = if n <= 1 || self.memo.contains(&n) {
            None
        } else {
            Some(self.factorial(n - 1)?)
        };
        self.memo
            .get_or_compute(n, || Ok(below.map_or_else(BigInt::one, |below| below * n)))
    }

    /// `n! / (r! (n - r)!)`. The trivial cases never touch the factorials,
    /// so `combination(0, 0)` works even on an empty cache.
    pub fn combination(&mut self, n: usize, r: usize) -> Result<BigInt, Error> {
        if r > n {
            return Err(Error::InvalidCombination { n, r });
        }
        if r == 0 || r == n {
            return Ok(BigInt::one());
        }
        let numerator = self.factorial(n)?;
        let denominator = self.factorial(r)? * self.factorial(n - r)?;
        Ok(numerator / denominator)
    }
}
