use crate::{Error, Memo};
use num::bigint::BigInt;
use num::rational::BigRational;
use num::traits::Zero;
use rand::rngs::SmallRng;
use rand::seq::index;
use rand::{Rng, SeedableRng};
use smallvec::{smallvec, SmallVec};
use static_assertions::const_assert;
use std::cmp;

/// Number of simulated runs averaged for a pool/target pair without a closed
/// form.
pub const TRIAL_COUNT: u32 = 1000;

const_assert!(TRIAL_COUNT > 0);

pub trait TrialSimulator {
    /// Number of probes one randomized run needs to isolate `target` marked
    /// items among `pool`.
    fn run_trial(&mut self, target: usize, pool: usize) -> u64;
}

impl<T: TrialSimulator + ?Sized> TrialSimulator for &mut T {
    fn run_trial(&mut self, target: usize, pool: usize) -> u64 {
        (**self).run_trial(target, pool)
    }
}

/// Splits every mixed segment in half and asks how many marked items the
/// left half holds. Uniform segments (all marked or none) are settled.
#[derive(Clone, Debug)]
pub struct BinarySearchSimulator<R = SmallRng> {
    rng: R,
}

impl BinarySearchSimulator<SmallRng> {
    pub fn seeded(seed: u64) -> Self {
        Self::new(SmallRng::seed_from_u64(seed))
    }

    pub fn from_entropy() -> Self {
        Self::new(SmallRng::from_entropy())
    }
}

impl<R: Rng> BinarySearchSimulator<R> {
    pub fn new(rng: R) -> Self {
        Self { rng }
    }
}

impl<R: Rng> TrialSimulator for BinarySearchSimulator<R> {
    fn run_trial(&mut self, target: usize, pool: usize) -> u64 {
        let mut marked = vec![false; pool];
        for i in index::sample(&mut self.rng, pool, target) {
            marked[i] = true;
        }
        // (start, len, marked count)
        let mut segments: SmallVec<[(usize, usize, usize); 16]> = smallvec![(0, pool, target)];
        let mut probes = 0;
        while let Some((start, len, count)) = segments.pop() {
            if count == 0 || count == len {
                continue;
            }
            let half = len / 2;
            let left = marked[start..start + half].iter().filter(|&&m| m).count();
            probes += 1;
            segments.push((start, half, left));
            segments.push((start + half, len - half, count - left));
        }
        probes
    }
}

/// Expected number of probes to find which `target` of `pool` answers
/// changed, memoized per `(pool, target)`.
#[derive(Clone, Debug)]
pub struct CostEstimator<S> {
    simulator: S,
    trial_count: u32,
    memo: Memo<(usize, usize), BigRational>,
    limit: usize,
    simulated_pairs: usize,
}

impl<S: TrialSimulator> CostEstimator<S> {
    pub fn new(simulator: S, limit: usize) -> Self {
        Self {
            simulator,
            trial_count: TRIAL_COUNT,
            memo: Memo::default(),
            limit,
            simulated_pairs: 0,
        }
    }

    pub fn with_trial_count(simulator: S, limit: usize, trial_count: u32) -> Result<Self, Error> {
        if trial_count == 0 {
            return Err(Error::InvalidTrialCount);
        }
        Ok(Self {
            trial_count,
            ..Self::new(simulator, limit)
        })
    }

    pub fn estimate(&mut self, pool: usize, target: usize) -> Result<BigRational, Error> {
        if pool >= self.limit {
            return Err(Error::OutOfRange {
                value: pool,
                limit: self.limit,
            });
        }
        if target > pool {
            return Err(Error::TargetExceedsPool { target, pool });
        }
        // Isolating `target` items is the same problem as isolating the
        // other `pool - target`.
        let target = cmp::min(target, pool - target);
        let Self {
            simulator,
            trial_count,
            memo,
            simulated_pairs,
            ..
        } = self;
        memo.get_or_compute((pool, target), || {
            if target == 0 || pool <= 1 {
                return Ok(BigRational::zero());
            }
            if target == 1 && pool.is_power_of_two() {
                return Ok(BigRational::from_integer(BigInt::from(
                    pool.trailing_zeros(),
                )));
            }
            *simulated_pairs += 1;
            let total: u64 = (0..*trial_count)
                .map(|_| simulator.run_trial(target, pool))
                .sum();
            Ok(BigRational::new(
                BigInt::from(total),
                BigInt::from(*trial_count),
            ))
        })
    }

    pub fn simulator(&self) -> &S {
        &self.simulator
    }

    pub fn trial_count(&self) -> u32 {
        self.trial_count
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Pairs that went through simulation rather than a closed form.
    pub fn simulated_pairs(&self) -> usize {
        self.simulated_pairs
    }

    pub fn cache_hits(&self) -> u32 {
        self.memo.hits()
    }

    pub fn len(&self) -> usize {
        self.memo.len()
    }

    pub fn is_empty(&self) -> bool {
        self.memo.is_empty()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use num::ToPrimitive;

    /// Returns a fixed probe count and records every call.
    #[derive(Clone, Debug, Default)]
    pub(crate) struct FixedSimulator {
        pub probes: u64,
        pub calls: u32,
    }

    impl FixedSimulator {
        pub fn new(probes: u64) -> Self {
            Self { probes, calls: 0 }
        }
    }

    impl TrialSimulator for FixedSimulator {
        fn run_trial(&mut self, _target: usize, _pool: usize) -> u64 {
            self.calls += 1;
            self.probes
        }
    }

    fn integer(n: i64) -> BigRational {
        BigRational::from_integer(BigInt::from(n))
    }

    #[test]
    fn power_of_two_shortcut() {
        let mut stub = FixedSimulator::new(99);
        let mut estimator = CostEstimator::new(&mut stub, 64);
        assert_eq!(estimator.estimate(2, 1).unwrap(), integer(1));
        assert_eq!(estimator.estimate(8, 1).unwrap(), integer(3));
        assert_eq!(estimator.estimate(16, 1).unwrap(), integer(4));
        assert_eq!(estimator.estimate(32, 31).unwrap(), integer(5));
        assert_eq!(estimator.simulated_pairs(), 0);
        drop(estimator);
        assert_eq!(stub.calls, 0);
    }

    #[test]
    fn trivial_pairs_cost_nothing() {
        let mut stub = FixedSimulator::new(99);
        let mut estimator = CostEstimator::new(&mut stub, 8);
        for (pool, target) in [(0, 0), (1, 0), (1, 1), (5, 0), (5, 5)] {
            assert!(estimator.estimate(pool, target).unwrap().is_zero());
        }
        drop(estimator);
        assert_eq!(stub.calls, 0);
    }

    #[test]
    fn simulation_runs_once_per_pair() {
        let mut stub = FixedSimulator::new(3);
        let mut estimator = CostEstimator::new(&mut stub, 8);
        let first = estimator.estimate(6, 2).unwrap();
        let second = estimator.estimate(6, 2).unwrap();
        assert_eq!(first, integer(3));
        assert_eq!(first, second);
        assert_eq!(estimator.simulated_pairs(), 1);
        assert_eq!(estimator.cache_hits(), 1);
        drop(estimator);
        assert_eq!(stub.calls, TRIAL_COUNT);
    }

    #[test]
    fn symmetric_in_target() {
        let mut stub = FixedSimulator::new(4);
        let mut estimator = CostEstimator::new(&mut stub, 16);
        for pool in 0..16 {
            for target in 0..=pool {
                assert_eq!(
                    estimator.estimate(pool, target).unwrap(),
                    estimator.estimate(pool, pool - target).unwrap(),
                    "{} {}",
                    pool,
                    target,
                );
            }
        }
    }

    #[test]
    fn mean_is_exact() {
        struct Alternating(u64);
        impl TrialSimulator for Alternating {
            fn run_trial(&mut self, _target: usize, _pool: usize) -> u64 {
                self.0 += 1;
                1 + self.0 % 2
            }
        }
        let mut estimator = CostEstimator::with_trial_count(Alternating(0), 8, 4).unwrap();
        assert_eq!(
            estimator.estimate(3, 1).unwrap(),
            BigRational::new(BigInt::from(3), BigInt::from(2)),
        );
    }

    #[test]
    fn rejects_bad_arguments() {
        let mut estimator = CostEstimator::new(FixedSimulator::new(1), 4);
        assert_eq!(
            estimator.estimate(4, 1),
            Err(Error::OutOfRange { value: 4, limit: 4 }),
        );
        assert_eq!(
            estimator.estimate(2, 3),
            Err(Error::TargetExceedsPool { target: 3, pool: 2 }),
        );
        assert!(matches!(
            CostEstimator::with_trial_count(FixedSimulator::new(1), 4, 0),
            Err(Error::InvalidTrialCount),
        ));
    }

    #[test]
    fn simulator_single_target_power_of_two() {
        let mut simulator = BinarySearchSimulator::seeded(7);
        for _ in 0..100 {
            assert_eq!(simulator.run_trial(1, 16), 4);
            assert_eq!(simulator.run_trial(15, 16), 4);
        }
        assert_eq!(simulator.run_trial(0, 9), 0);
        assert_eq!(simulator.run_trial(9, 9), 0);
    }

    #[test]
    fn simulated_estimate_is_close() {
        // One of three: a third of the time the first probe settles it.
        let mut estimator = CostEstimator::new(BinarySearchSimulator::seeded(1), 8);
        let estimate = estimator.estimate(3, 1).unwrap().to_f64().unwrap();
        assert!((estimate - 5.0 / 3.0).abs() < 0.1, "{}", estimate);
    }

    #[test]
    fn simulator_is_symmetric_in_distribution() {
        let mut simulator = BinarySearchSimulator::seeded(42);
        let n = 4000;
        let mean = |simulator: &mut BinarySearchSimulator, target| {
            (0..n).map(|_| simulator.run_trial(target, 7)).sum::<u64>() as f64 / n as f64
        };
        let low = mean(&mut simulator, 2);
        let high = mean(&mut simulator, 5);
        assert!((low - high).abs() < 0.15, "{} {}", low, high);
    }

    #[test]
    fn seeded_simulator_is_reproducible() {
        let run = |seed| {
            let mut estimator = CostEstimator::new(BinarySearchSimulator::seeded(seed), 12);
            estimator.estimate(11, 4).unwrap()
        };
        assert_eq!(run(5), run(5));
    }
}
