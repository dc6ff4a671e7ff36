//! Period numbering and the open → finalized state machine.
//!
//! A period is *unseen* until the first commitment that targets it, *open*
//! while commitments accumulate, and *finalized* once period `N + 2` is first
//! opened. Finalization is a one-way transition.

use rust_decimal::Decimal;

use stakeledger_core::error::{DomainError, DomainResult};
use stakeledger_core::models::checked_add;

use super::models::Period;

/// Block timestamp of the final genesis period; periods become weekly after it.
pub const MIGRATION_TIMESTAMP: i64 = 1_618_358_661;

/// Period length before the migration (seconds).
pub const GENESIS_PERIOD_DURATION: i64 = 86_400;

/// Period length after the migration (seconds).
pub const PERIOD_DURATION: i64 = 604_800;

/// Periods numbered above this belong to the genesis era.
pub const GENESIS_ERA_PERIOD_NUMBER: u64 = 18_000;

/// Opening period `N` finalizes period `N - FINALIZATION_LAG`.
pub const FINALIZATION_LAG: u64 = 2;

/// Maps block timestamps to period numbers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeriodClock {
    pub migration_timestamp: i64,
    pub genesis_period_duration: i64,
    pub period_duration: i64,
}

impl Default for PeriodClock {
    fn default() -> Self {
        Self {
            migration_timestamp: MIGRATION_TIMESTAMP,
            genesis_period_duration: GENESIS_PERIOD_DURATION,
            period_duration: PERIOD_DURATION,
        }
    }
}

impl PeriodClock {
    /// Period number containing `timestamp` (unix seconds).
    pub fn period_at(&self, timestamp: i64) -> u64 {
        let duration = if timestamp < self.migration_timestamp {
            self.genesis_period_duration
        } else {
            self.period_duration
        };
        u64::try_from(timestamp.max(0) / duration).unwrap_or(0)
    }
}

/// Period finalized when `opened` is first created, if any.
pub fn finalization_target(opened: u64) -> Option<u64> {
    opened.checked_sub(FINALIZATION_LAG)
}

impl Period {
    /// Open a period with zeroed accumulators.
    pub fn open(number: u64, timestamp: i64) -> Self {
        Self {
            id: number.to_string(),
            timestamp,
            total_staked: Decimal::ZERO,
            active_stakers: 0,
            circulating_supply: Decimal::ZERO,
            participation_rate: Decimal::ZERO,
            minted: Decimal::ZERO,
            finalized: false,
            genesis: number > GENESIS_ERA_PERIOD_NUMBER,
        }
    }

    /// Account one commitment of `value` tokens.
    pub fn record_commitment(&mut self, value: Decimal) -> DomainResult<()> {
        self.total_staked = checked_add(self.total_staked, value, "period.totalStaked")?;
        self.active_stakers += 1;
        Ok(())
    }

    /// Finalize with the circulating supply read from chain state.
    ///
    /// Returns `false` without touching any field if already finalized. The
    /// participation rate stays zero when nothing is staked or the supply is
    /// zero.
    pub fn finalize(&mut self, circulating_supply: Decimal) -> DomainResult<bool> {
        if self.finalized {
            return Ok(false);
        }

        self.circulating_supply = circulating_supply;
        if self.total_staked > Decimal::ZERO && circulating_supply > Decimal::ZERO {
            self.participation_rate = self
                .total_staked
                .checked_div(circulating_supply)
                .ok_or_else(|| {
                    DomainError::ArithmeticOverflow(format!(
                        "period {} participation rate",
                        self.id
                    ))
                })?;
        }
        self.finalized = true;
        Ok(true)
    }
}
