//! Sources of review and test outcomes.
//!
//! Sub stages never draw outcomes themselves; they ask an [`Oracle`]. The
//! engine binary uses [`RandomOracle`] (optionally seeded) or
//! [`OptimisticOracle`]; tests script exact sequences.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::warn;

use crate::core::types::Verdict;
use crate::io::config::{OracleConfig, OracleKind};

/// Result of one system-test draw.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SystemTestReport {
    pub verdict: Verdict,
    pub bugs_remaining: bool,
}

/// Injected signal source for review and test stages.
pub trait Oracle {
    fn review_verdict(&mut self) -> Verdict;

    /// Percentage in `0..=100`.
    fn unit_test_pass_rate(&mut self) -> u32;

    fn integration_verdict(&mut self) -> Verdict;

    fn system_test(&mut self) -> SystemTestReport;

    /// Whether bugs remain after bug-fix iteration `iteration` (1-based).
    fn bugs_remaining_after_fix(&mut self, iteration: u32) -> bool;
}

impl<T: Oracle + ?Sized> Oracle for Box<T> {
    fn review_verdict(&mut self) -> Verdict {
        (**self).review_verdict()
    }

    fn unit_test_pass_rate(&mut self) -> u32 {
        (**self).unit_test_pass_rate()
    }

    fn integration_verdict(&mut self) -> Verdict {
        (**self).integration_verdict()
    }

    fn system_test(&mut self) -> SystemTestReport {
        (**self).system_test()
    }

    fn bugs_remaining_after_fix(&mut self, iteration: u32) -> bool {
        (**self).bugs_remaining_after_fix(iteration)
    }
}

impl<T: Oracle + ?Sized> Oracle for &mut T {
    fn review_verdict(&mut self) -> Verdict {
        (**self).review_verdict()
    }

    fn unit_test_pass_rate(&mut self) -> u32 {
        (**self).unit_test_pass_rate()
    }

    fn integration_verdict(&mut self) -> Verdict {
        (**self).integration_verdict()
    }

    fn system_test(&mut self) -> SystemTestReport {
        (**self).system_test()
    }

    fn bugs_remaining_after_fix(&mut self, iteration: u32) -> bool {
        (**self).bugs_remaining_after_fix(iteration)
    }
}

/// Probability that bug-fix iteration `iteration` resolves every remaining bug.
///
/// Grows by 0.3 per iteration and is capped at 0.9.
pub fn fix_resolution_probability(iteration: u32) -> f64 {
    (0.3 * f64::from(iteration)).min(0.9)
}

/// Lowest unit-test pass rate a random draw produces.
pub const MIN_RANDOM_PASS_RATE: u32 = 80;

/// Outcomes drawn from a random number generator.
#[derive(Debug, Clone)]
pub struct RandomOracle<R: Rng = StdRng> {
    rng: R,
}

impl RandomOracle<StdRng> {
    pub fn from_entropy() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }

    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl<R: Rng> RandomOracle<R> {
    pub fn with_rng(rng: R) -> Self {
        Self { rng }
    }

    fn verdict(&mut self) -> Verdict {
        if self.rng.gen_bool(0.5) {
            Verdict::Pass
        } else {
            Verdict::Fail
        }
    }
}

impl<R: Rng> Oracle for RandomOracle<R> {
    fn review_verdict(&mut self) -> Verdict {
        self.verdict()
    }

    fn unit_test_pass_rate(&mut self) -> u32 {
        self.rng.gen_range(MIN_RANDOM_PASS_RATE..=100)
    }

    fn integration_verdict(&mut self) -> Verdict {
        self.verdict()
    }

    fn system_test(&mut self) -> SystemTestReport {
        let verdict = self.verdict();
        let bugs_remaining = self.rng.gen_bool(0.5);
        SystemTestReport {
            verdict,
            bugs_remaining,
        }
    }

    fn bugs_remaining_after_fix(&mut self, iteration: u32) -> bool {
        !self.rng.gen_bool(fix_resolution_probability(iteration))
    }
}

/// Every review and test passes; a dry run always reaches the merge stage.
#[derive(Debug, Clone, Copy, Default)]
pub struct OptimisticOracle;

impl Oracle for OptimisticOracle {
    fn review_verdict(&mut self) -> Verdict {
        Verdict::Pass
    }

    fn unit_test_pass_rate(&mut self) -> u32 {
        100
    }

    fn integration_verdict(&mut self) -> Verdict {
        Verdict::Pass
    }

    fn system_test(&mut self) -> SystemTestReport {
        SystemTestReport {
            verdict: Verdict::Pass,
            bugs_remaining: false,
        }
    }

    fn bugs_remaining_after_fix(&mut self, _iteration: u32) -> bool {
        false
    }
}

/// Build the oracle selected by `config`. `seed_override` wins over `config.seed`.
pub fn oracle_from_config(config: &OracleConfig, seed_override: Option<u64>) -> Box<dyn Oracle> {
    match config.kind {
        OracleKind::Optimistic => {
            if let Some(seed) = seed_override.or(config.seed) {
                warn!(seed, "seed has no effect with the optimistic oracle");
            }
            Box::new(OptimisticOracle)
        }
        OracleKind::Random => match seed_override.or(config.seed) {
            Some(seed) => Box::new(RandomOracle::seeded(seed)),
            None => Box::new(RandomOracle::from_entropy()),
        },
    }
}
