use rust_decimal::{Decimal, MathematicalOps};

/// Months of spend history the seasonal rule looks at.
pub(crate) const HISTORY_MONTHS: usize = 12;

/// Index in the history of the month that, one year ago, matched the month
/// after the current period. History covers the 12 months before the period,
/// oldest first, so that month is the second entry.
const UPCOMING_INDEX: usize = 1;

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct SeasonalSpike {
    pub(crate) mean: Decimal,
    pub(crate) stddev: Decimal,
    pub(crate) threshold: Decimal,
    pub(crate) upcoming: Decimal,
}

/// Flag next month when its spend last year stood above the 12-month mean by
/// more than 1.5 standard deviations.
pub(crate) fn seasonal_spike(history: &[Decimal]) -> Option<SeasonalSpike> {
    if history.len() != HISTORY_MONTHS {
        return None;
    }
    let n = Decimal::from(HISTORY_MONTHS as u64);
    let mean = history.iter().sum::<Decimal>() / n;
    if mean <= Decimal::ZERO {
        return None;
    }
    let variance = history
        .iter()
        .map(|x| (*x - mean) * (*x - mean))
        .sum::<Decimal>()
        / n;
    let stddev = variance.sqrt()?;
    let threshold = mean + stddev * Decimal::new(15, 1);
    let upcoming = history[UPCOMING_INDEX];

    (upcoming > threshold).then_some(SeasonalSpike {
        mean,
        stddev,
        threshold,
        upcoming,
    })
}
