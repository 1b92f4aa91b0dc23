use rand::{Rng, SeedableRng};
use rand_pcg::Pcg64Mcg;
use statrs::distribution::Normal;

use super::types::{MarketRegime, SimulationParams};

const MIN_EQUITY_WEIGHT: f64 = 0.10;
const TRIAL_STREAM_SALT: u64 = 0x9e37_79b9_7f4a_7c15;

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct AssetReturns {
    pub equity: f64,
    pub bonds: f64,
    pub real_estate: f64,
    pub cash: f64,
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct AssetWeights {
    pub equity: f64,
    pub bonds: f64,
    pub real_estate: f64,
    pub cash: f64,
}

impl AssetWeights {
    pub fn dot(self, returns: AssetReturns) -> f64 {
        self.equity * returns.equity
            + self.bonds * returns.bonds
            + self.real_estate * returns.real_estate
            + self.cash * returns.cash
    }

    pub fn sum(self) -> f64 {
        self.equity + self.bonds + self.real_estate + self.cash
    }
}

/// Expected returns for one year offset: the configured baseline means with
/// the regime's overrides applied.
pub fn return_means_for_year(params: &SimulationParams, year_offset: usize) -> AssetReturns {
    let base = AssetReturns {
        equity: params.equity_mean,
        bonds: params.bonds_mean,
        real_estate: params.real_estate_mean,
        cash: params.cash_mean,
    };
    match params.regime {
        MarketRegime::Baseline => base,
        MarketRegime::RecessionRecover => match year_offset {
            0 => AssetReturns {
                equity: -0.15,
                ..base
            },
            1 => AssetReturns { equity: 0.0, ..base },
            _ => base,
        },
        MarketRegime::GrindLower => match year_offset {
            0..=9 => AssetReturns {
                equity: 0.005,
                bonds: 0.01,
                real_estate: 0.005,
                ..base
            },
            _ => base,
        },
        MarketRegime::LateRecession => match year_offset {
            10 => AssetReturns {
                equity: -0.20,
                real_estate: -0.05,
                ..base
            },
            11 => AssetReturns {
                equity: -0.05,
                real_estate: 0.0,
                ..base
            },
            12 => AssetReturns {
                equity: 0.15,
                real_estate: 0.05,
                ..base
            },
            _ => base,
        },
        MarketRegime::InflationShock => match year_offset {
            3..=7 => AssetReturns {
                equity: 0.01,
                bonds: -0.02,
                real_estate: 0.08,
                cash: 0.01,
            },
            _ => base,
        },
        MarketRegime::LongBear => match year_offset {
            5..=15 => AssetReturns {
                equity: 0.02,
                bonds: 0.025,
                real_estate: 0.015,
                ..base
            },
            _ => base,
        },
        MarketRegime::TechBubble => match year_offset {
            0..=3 => AssetReturns {
                equity: base.equity * 1.5,
                ..base
            },
            4..=6 => AssetReturns {
                equity: -0.10,
                ..base
            },
            _ => base,
        },
        MarketRegime::Custom {
            shock_year,
            shock_return,
            shock_duration,
            recovery_years,
            recovery_return,
        } => {
            let shock_end = shock_year + shock_duration;
            let recovery_end = shock_end + recovery_years;
            if year_offset >= shock_year && year_offset < shock_end {
                AssetReturns {
                    equity: shock_return,
                    ..base
                }
            } else if year_offset >= shock_end && year_offset < recovery_end {
                AssetReturns {
                    equity: recovery_return,
                    ..base
                }
            } else {
                base
            }
        }
    }
}

/// Allocation for one year offset. With the glide path on, equity declines
/// linearly to a 10% floor and the freed weight is spread over the other
/// sleeves in proportion to their starting shares.
pub fn weights_for_year(params: &SimulationParams, year_offset: usize) -> AssetWeights {
    let base = AssetWeights {
        equity: params.w_equity,
        bonds: params.w_bonds,
        real_estate: params.w_real_estate,
        cash: params.w_cash,
    };
    if !params.glide_path_enabled {
        return base;
    }
    let target_equity = (base.equity - params.equity_reduction_per_year * year_offset as f64)
        .max(MIN_EQUITY_WEIGHT);
    let freed = base.equity - target_equity;
    if freed <= 0.0 {
        return base;
    }
    let others = base.bonds + base.real_estate + base.cash;
    if others > 0.0 {
        AssetWeights {
            equity: target_equity,
            bonds: base.bonds + freed * base.bonds / others,
            real_estate: base.real_estate + freed * base.real_estate / others,
            cash: base.cash + freed * base.cash / others,
        }
    } else {
        AssetWeights {
            equity: target_equity,
            bonds: base.bonds + freed,
            ..base
        }
    }
}

/// Decorrelated per-trial stream so trials can be replayed independently of
/// the order they ran in.
pub(crate) fn trial_stream(master_seed: u64, trial_index: u64) -> Pcg64Mcg {
    Pcg64Mcg::seed_from_u64(master_seed ^ trial_index.wrapping_mul(TRIAL_STREAM_SALT))
}

fn draw(rng: &mut Pcg64Mcg, mean: f64, vol: f64) -> f64 {
    if vol <= 0.0 {
        return mean;
    }
    Normal::new(mean, vol)
        .map(|dist| rng.sample(dist))
        .unwrap_or(mean)
}

/// One year of returns, each asset drawn from its own normal. Draw order is
/// fixed so replays with the same stream reproduce exactly.
pub(crate) fn sample_returns(
    rng: &mut Pcg64Mcg,
    params: &SimulationParams,
    means: AssetReturns,
) -> AssetReturns {
    AssetReturns {
        equity: draw(rng, means.equity, params.equity_vol),
        bonds: draw(rng, means.bonds, params.bonds_vol),
        real_estate: draw(rng, means.real_estate, params.real_estate_vol),
        cash: draw(rng, means.cash, params.cash_vol),
    }
}
