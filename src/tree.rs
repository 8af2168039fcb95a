//! Expected number of attempts to reach an exact target score when every
//! attempt reports only how many answers were correct.
//!
//! The walk branches on how many answers are still wrong after each
//! attempt. A branch that leaves some answers wrong has to find out which
//! ones flipped before the next attempt, which costs extra probes priced by
//! the [`CostEstimator`].

use crate::bincheck::{CostEstimator, TrialSimulator};
use crate::combin::FactorialCache;
use crate::{tree_progress, Error, ProgressSink, ProgressTracker};
use num::bigint::BigInt;
use num::rational::BigRational;
use num::traits::{One, Zero};

#[derive(Clone, Debug)]
struct AttemptState {
    /// Correct answers after the previous attempt.
    score: usize,
    attempts: BigRational,
    probability: BigRational,
    depth: usize,
    /// Outcomes that can still be told apart at this node.
    branch_count: usize,
}

#[derive(Clone, Debug)]
pub struct Evaluator<S> {
    option_count: usize,
    factorials: FactorialCache,
    costs: CostEstimator<S>,
    nodes_visited: u64,
}

impl<S: TrialSimulator> Evaluator<S> {
    /// The factorial cache shares the cost estimator's limit, so every
    /// target score below it can be evaluated.
    pub fn new(option_count: usize, costs: CostEstimator<S>) -> Result<Self, Error> {
        if option_count == 0 {
            return Err(Error::InvalidOptionCount(option_count));
        }
        Ok(Self {
            option_count,
            factorials: FactorialCache::new(costs.limit()),
            costs,
            nodes_visited: 0,
        })
    }

    pub fn option_count(&self) -> usize {
        self.option_count
    }

    pub fn factorials(&self) -> &FactorialCache {
        &self.factorials
    }

    pub fn costs(&self) -> &CostEstimator<S> {
        &self.costs
    }

    pub fn nodes_visited(&self) -> u64 {
        self.nodes_visited
    }

    pub fn expected_attempts(&mut self, k: usize) -> Result<BigRational, Error> {
        self.expected_attempts_with_progress(k, &mut |_, _| {})
    }

    pub fn expected_attempts_with_progress(
        &mut self,
        k: usize,
        progress_sink: &mut ProgressSink,
    ) -> Result<BigRational, Error> {
        if k >= self.costs.limit() {
            return Err(Error::OutOfRange {
                value: k,
                limit: self.costs.limit(),
            });
        }
        let mut context = EvaluatorContext {
            k,
            evaluator: self,
            progress: Vec::default(),
            progress_tracker: ProgressTracker::new(progress_sink),
        };
        context.expand(AttemptState {
            score: 0,
            attempts: BigRational::zero(),
            probability: BigRational::one(),
            depth: 0,
            branch_count: k + 1,
        })
    }
}

struct EvaluatorContext<'a, 'p, S> {
    k: usize,
    evaluator: &'a mut Evaluator<S>,
    progress: Vec<(f64, f64)>,
    progress_tracker: ProgressTracker<'p>,
}

impl<'a, 'p, S: TrialSimulator> EvaluatorContext<'a, 'p, S> {
    /// Probability that exactly `still_wrong` of `incorrect` answers stay
    /// wrong when each flips to correct with chance `1 / remaining options`.
    fn branch_probability(
        &mut self,
        incorrect: usize,
        still_wrong: usize,
        depth: usize,
    ) -> Result<BigRational, Error> {
        let remaining = self.evaluator.option_count - depth;
        let hit = BigRational::new(BigInt::one(), BigInt::from(remaining));
        let miss = BigRational::one() - &hit;
        let flipped = incorrect - still_wrong;
        let ways = self.evaluator.factorials.combination(incorrect, flipped)?;
        Ok(BigRational::from_integer(ways) * num::pow(hit, flipped) * num::pow(miss, still_wrong))
    }

    fn expand(&mut self, state: AttemptState) -> Result<BigRational, Error> {
        let k = self.k;
        let depth = state.depth;
        self.evaluator.nodes_visited += 1;
        self.progress_tracker.tick(&mut || {
            (
                tree_progress(&self.progress),
                format!(
                    "[depth={} nodes={} pairs={}]",
                    depth,
                    self.evaluator.nodes_visited,
                    self.evaluator.costs.len(),
                ),
            )
        });
        // The last attempt before the options run out overlaps with the one
        // before it: nothing new is scored.
        let last = depth + 1 == self.evaluator.option_count;
        let branch_count = if last { 1 } else { state.branch_count };
        let incorrect = k - state.score;
        let mut expectation = BigRational::zero();
        for still_wrong in 0..branch_count {
            debug_assert!(still_wrong <= incorrect);
            let score = k - still_wrong;
            let (mut attempts, probability) = if last {
                (state.attempts.clone(), state.probability.clone())
            } else {
                (
                    &state.attempts + BigRational::one(),
                    &state.probability * self.branch_probability(incorrect, still_wrong, depth)?,
                )
            };
            if score == k {
                expectation += attempts * probability;
                continue;
            }
            let gained = score - state.score;
            if gained != 0 && incorrect != 1 {
                attempts += self.evaluator.costs.estimate(incorrect, gained)?;
            }
            self.progress.push((
                still_wrong as f64 / branch_count as f64,
                1.0 / branch_count as f64,
            ));
            let subtree = self.expand(AttemptState {
                score,
                attempts,
                probability,
                depth: depth + 1,
                // Answers already right stay right.
                branch_count: still_wrong + 1,
            });
            self.progress.pop();
            expectation += subtree?;
        }
        Ok(expectation)
    }
}
