use log::{debug, warn};

use super::flows::{
    college_topup_for_year, expense_total_for_year, income_total_for_year, re_income_for_year,
    social_security_for_year,
};
use super::market::{
    AssetWeights, return_means_for_year, sample_returns, trial_stream, weights_for_year,
};
use super::tax::solve_gross_withdrawal_detailed;
use super::types::{
    GuardrailAction, ParamError, PercentilePath, SimulationParams, SimulationResults,
    SummaryStats, WealthBands, YearDetail,
};

const CAPE_INTERCEPT: f64 = 0.0175;
const CAPE_SLOPE: f64 = 0.5;
const PERCENTILE_PATH_LEVELS: [u8; 3] = [10, 50, 90];

pub struct RetirementSimulator {
    params: SimulationParams,
}

pub(crate) struct TrialState {
    pub(crate) portfolio: f64,
    pub(crate) trailing_base_spend: f64,
    pub(crate) guardrail_hits: u32,
    pub(crate) year_depleted: i32,
}

impl TrialState {
    pub(crate) fn new(params: &SimulationParams) -> Self {
        Self {
            portfolio: params.start_capital,
            trailing_base_spend: initial_base_spending(params),
            guardrail_hits: 0,
            year_depleted: -1,
        }
    }
}

pub(crate) struct YearStep {
    pub(crate) detail: YearDetail,
    pub(crate) solver_converged: bool,
}

struct TrialRun {
    terminal_wealth: f64,
    wealth_path: Vec<f64>,
    guardrail_hits: u32,
    year_depleted: i32,
    solver_failures: u64,
    details: Option<Vec<YearDetail>>,
}

/// First-year base spending: fixed amount if set, then an explicit starting
/// base, then the CAPE rule applied to starting capital.
pub(crate) fn initial_base_spending(params: &SimulationParams) -> f64 {
    if let Some(fixed) = params.fixed_annual_spending {
        return fixed;
    }
    if let Some(initial) = params.initial_base_spending {
        return initial;
    }
    (CAPE_INTERCEPT + CAPE_SLOPE / params.cape_now) * params.start_capital
}

fn apply_guardrails(
    params: &SimulationParams,
    trailing_base_spend: f64,
    portfolio_value: f64,
) -> (f64, GuardrailAction) {
    if portfolio_value <= 0.0 {
        return (trailing_base_spend, GuardrailAction::None);
    }
    let withdrawal_rate = trailing_base_spend / portfolio_value;
    if withdrawal_rate > params.upper_guardrail {
        (
            trailing_base_spend * (1.0 - params.guardrail_adjustment),
            GuardrailAction::Down,
        )
    } else if withdrawal_rate < params.lower_guardrail {
        (
            trailing_base_spend * (1.0 + params.guardrail_adjustment),
            GuardrailAction::Up,
        )
    } else {
        (trailing_base_spend, GuardrailAction::None)
    }
}

fn apply_spending_bounds(params: &SimulationParams, spending: f64, year: i32) -> (f64, bool, bool) {
    let mut bounded = spending;
    let mut floor_applied = false;
    let mut ceiling_applied = false;
    if year <= params.floor_end_year && bounded < params.spending_floor_real {
        bounded = params.spending_floor_real;
        floor_applied = true;
    }
    if bounded > params.spending_ceiling_real {
        bounded = params.spending_ceiling_real;
        ceiling_applied = true;
    }
    (bounded, floor_applied, ceiling_applied)
}

/// Advances one trial by one year. Guardrails react to the start-of-year
/// balance; the guardrail-adjusted base carries forward unclamped while the
/// floor and ceiling bound only what is spent this year. Returns compound on
/// the start-of-year balance and the withdrawal comes out at year end.
pub(crate) fn simulate_year(
    params: &SimulationParams,
    state: &mut TrialState,
    year_idx: usize,
    weights: AssetWeights,
    portfolio_return: f64,
) -> YearStep {
    let year = params.start_year + year_idx as i32;
    let start_assets = state.portfolio;

    let fixed_mode = params.fixed_annual_spending.is_some();
    let (base_spending, guardrail_action) = if fixed_mode {
        (state.trailing_base_spend, GuardrailAction::None)
    } else {
        apply_guardrails(params, state.trailing_base_spend, start_assets)
    };
    if guardrail_action != GuardrailAction::None {
        state.guardrail_hits += 1;
        state.trailing_base_spend = base_spending;
    }
    let (adjusted_base_spending, floor_applied, ceiling_applied) = if fixed_mode {
        (base_spending, false, false)
    } else {
        apply_spending_bounds(params, base_spending, year)
    };

    let college_topup = college_topup_for_year(params, year);
    let expense_total = expense_total_for_year(params, year);
    let total_need = adjusted_base_spending + college_topup + expense_total;

    let re_income = re_income_for_year(params, year);
    let other_income = income_total_for_year(params, year);
    let ss_income = social_security_for_year(params, year);
    let net_need = total_need - re_income - other_income - ss_income;

    let solve = solve_gross_withdrawal_detailed(
        net_need,
        0.0,
        params.standard_deduction,
        &params.tax_brackets,
    );

    let growth = start_assets * portfolio_return;
    state.portfolio *= 1.0 + portfolio_return;

    let mut inheritance = 0.0;
    if year == params.inherit_year {
        inheritance = params.inherit_amount;
        state.portfolio += inheritance;
    }

    state.portfolio = (state.portfolio - solve.gross).max(0.0);
    if state.portfolio <= 0.0 && state.year_depleted == -1 {
        state.year_depleted = year_idx as i32 + 1;
    }

    let withdrawal_rate = if start_assets > 0.0 {
        solve.gross / start_assets
    } else {
        0.0
    };

    YearStep {
        solver_converged: solve.converged,
        detail: YearDetail {
            year,
            start_assets,
            base_spending,
            guardrail_action,
            floor_applied,
            ceiling_applied,
            adjusted_base_spending,
            college_topup,
            expense_total,
            re_income,
            other_income,
            ss_income,
            net_need,
            gross_withdrawal: solve.gross,
            taxable_income: (solve.gross - params.standard_deduction).max(0.0),
            taxes: solve.tax,
            growth,
            inheritance,
            end_assets: state.portfolio,
            withdrawal_rate,
            w_equity: weights.equity,
            w_bonds: weights.bonds,
            w_real_estate: weights.real_estate,
            w_cash: weights.cash,
        },
    }
}

impl RetirementSimulator {
    pub fn new(params: SimulationParams) -> Result<Self, ParamError> {
        params.validate()?;
        Ok(Self { params })
    }

    pub fn params(&self) -> &SimulationParams {
        &self.params
    }

    pub fn run(&self) -> SimulationResults {
        let params = &self.params;
        let master_seed = params.random_seed.unwrap_or_else(rand::random);
        debug!(
            "running {} trials over {} years (master seed {master_seed})",
            params.num_trials, params.horizon_years
        );

        let n = params.num_trials;
        let mut terminal_wealth = Vec::with_capacity(n);
        let mut wealth_paths = Vec::with_capacity(n);
        let mut guardrail_hits = Vec::with_capacity(n);
        let mut years_depleted = Vec::with_capacity(n);
        let mut solver_failures = 0u64;

        for trial_index in 0..n {
            let trial = self.run_trial(master_seed, trial_index, false);
            terminal_wealth.push(trial.terminal_wealth);
            wealth_paths.push(trial.wealth_path);
            guardrail_hits.push(trial.guardrail_hits);
            years_depleted.push(trial.year_depleted);
            solver_failures += trial.solver_failures;
        }
        if solver_failures > 0 {
            warn!("gross-up solver exhausted its iteration budget {solver_failures} times");
        }

        let success_rate = if n == 0 {
            0.0
        } else {
            years_depleted.iter().filter(|&&y| y == -1).count() as f64 / n as f64
        };
        let percentile_paths = self.extract_percentile_paths(master_seed, &terminal_wealth);
        let wealth_bands = wealth_bands(&wealth_paths, params.horizon_years);
        let summary = summary_stats(&terminal_wealth);

        SimulationResults {
            terminal_wealth,
            wealth_paths,
            guardrail_hits,
            years_depleted,
            success_rate,
            percentile_paths,
            wealth_bands,
            summary,
            solver_failures,
        }
    }

    fn run_trial(&self, master_seed: u64, trial_index: usize, collect: bool) -> TrialRun {
        let params = &self.params;
        let mut rng = trial_stream(master_seed, trial_index as u64);
        let mut state = TrialState::new(params);
        let mut wealth_path = Vec::with_capacity(params.horizon_years + 1);
        wealth_path.push(state.portfolio);
        let mut details = collect.then(|| Vec::with_capacity(params.horizon_years));
        let mut solver_failures = 0u64;

        for year_idx in 0..params.horizon_years {
            let weights = weights_for_year(params, year_idx);
            let means = return_means_for_year(params, year_idx);
            let sampled = sample_returns(&mut rng, params, means);
            let step = simulate_year(params, &mut state, year_idx, weights, weights.dot(sampled));
            if !step.solver_converged {
                solver_failures += 1;
            }
            wealth_path.push(state.portfolio);
            if let Some(rows) = details.as_mut() {
                rows.push(step.detail);
            }
        }

        TrialRun {
            terminal_wealth: state.portfolio,
            wealth_path,
            guardrail_hits: state.guardrail_hits,
            year_depleted: state.year_depleted,
            solver_failures,
            details,
        }
    }

    /// Replays the trials sitting at the 10th, 50th and 90th percentiles of
    /// terminal wealth to collect their year-by-year detail. Each trial owns
    /// a derived stream, so a replay reproduces the first pass exactly.
    fn extract_percentile_paths(
        &self,
        master_seed: u64,
        terminal_wealth: &[f64],
    ) -> Vec<PercentilePath> {
        let n = terminal_wealth.len();
        if n == 0 {
            return Vec::new();
        }
        let mut order: Vec<usize> = (0..n).collect();
        order.sort_by(|&a, &b| terminal_wealth[a].total_cmp(&terminal_wealth[b]));

        PERCENTILE_PATH_LEVELS
            .iter()
            .map(|&level| {
                let rank = ((level as f64 / 100.0) * n as f64).floor() as usize;
                let trial_index = order[rank.min(n - 1)];
                let replay = self.run_trial(master_seed, trial_index, true);
                PercentilePath {
                    percentile: level,
                    trial_index,
                    terminal_wealth: replay.terminal_wealth,
                    years: replay.details.unwrap_or_default(),
                }
            })
            .collect()
    }
}

fn percentile_sorted(sorted: &[f64], p: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let rank = (p / 100.0) * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    if lo == hi {
        return sorted[lo];
    }
    let frac = rank - lo as f64;
    sorted[lo] * (1.0 - frac) + sorted[hi] * frac
}

fn percentile(values: &mut [f64], p: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.sort_unstable_by(|a, b| a.total_cmp(b));
    percentile_sorted(values, p)
}

fn wealth_bands(wealth_paths: &[Vec<f64>], horizon_years: usize) -> WealthBands {
    let mut bands = WealthBands {
        p10: Vec::new(),
        p50: Vec::new(),
        p90: Vec::new(),
    };
    if wealth_paths.is_empty() {
        return bands;
    }
    for year in 0..=horizon_years {
        let mut column: Vec<f64> = wealth_paths.iter().map(|path| path[year]).collect();
        column.sort_unstable_by(|a, b| a.total_cmp(b));
        bands.p10.push(percentile_sorted(&column, 10.0));
        bands.p50.push(percentile_sorted(&column, 50.0));
        bands.p90.push(percentile_sorted(&column, 90.0));
    }
    bands
}

fn summary_stats(terminal_wealth: &[f64]) -> SummaryStats {
    if terminal_wealth.is_empty() {
        return SummaryStats {
            mean: 0.0,
            p10: 0.0,
            p50: 0.0,
            p90: 0.0,
        };
    }
    let mean = terminal_wealth.iter().sum::<f64>() / terminal_wealth.len() as f64;
    let mut sorted = terminal_wealth.to_vec();
    let p10 = percentile(&mut sorted, 10.0);
    let p50 = percentile_sorted(&sorted, 50.0);
    let p90 = percentile_sorted(&sorted, 90.0);
    SummaryStats { mean, p10, p50, p90 }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;
    use crate::core::types::ReFlowPreset;

    const EPS: f64 = 1e-6;

    fn assert_approx(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() < EPS,
            "expected {expected}, got {actual}"
        );
    }

    // Zero volatility, no side flows, a deduction large enough to zero out
    // taxes, and guardrails parked where they cannot trigger.
    fn quiet_params() -> SimulationParams {
        SimulationParams {
            start_year: 2026,
            horizon_years: 10,
            num_trials: 1,
            random_seed: Some(7),
            start_capital: 1_000_000.0,
            equity_mean: 0.0,
            equity_vol: 0.0,
            bonds_mean: 0.0,
            bonds_vol: 0.0,
            real_estate_mean: 0.0,
            real_estate_vol: 0.0,
            cash_mean: 0.0,
            cash_vol: 0.0,
            cape_now: 25.0,
            lower_guardrail: 0.0,
            upper_guardrail: 1.0,
            spending_floor_real: 0.0,
            spending_ceiling_real: 1e12,
            re_flow_enabled: false,
            college_enabled: false,
            inherit_amount: 0.0,
            social_security_enabled: false,
            standard_deduction: 10_000_000.0,
            ..SimulationParams::default()
        }
    }

    fn noisy_params(trials: usize, seed: u64) -> SimulationParams {
        SimulationParams {
            horizon_years: 25,
            num_trials: trials,
            random_seed: Some(seed),
            start_capital: 3_000_000.0,
            initial_base_spending: Some(120_000.0),
            ..SimulationParams::default()
        }
    }

    fn p50_years(results: &SimulationResults) -> &[YearDetail] {
        &results.percentile_paths[1].years
    }

    #[test]
    fn cape_rule_sets_initial_spending() {
        let params = quiet_params();
        assert_approx(initial_base_spending(&params), 37_500.0);

        let results = RetirementSimulator::new(params).unwrap().run();
        assert_approx(p50_years(&results)[0].base_spending, 37_500.0);
    }

    #[test]
    fn explicit_initial_spending_overrides_cape() {
        let params = SimulationParams {
            initial_base_spending: Some(80_000.0),
            ..quiet_params()
        };
        assert_approx(initial_base_spending(&params), 80_000.0);
    }

    #[test]
    fn fixed_spending_outranks_initial_spending() {
        let params = SimulationParams {
            initial_base_spending: Some(80_000.0),
            fixed_annual_spending: Some(55_000.0),
            ..quiet_params()
        };
        assert_approx(initial_base_spending(&params), 55_000.0);
    }

    #[test]
    fn seeded_runs_reproduce_exactly() {
        let params = noisy_params(100, 42);
        let first = RetirementSimulator::new(params.clone()).unwrap().run();
        let second = RetirementSimulator::new(params).unwrap().run();
        assert_eq!(first.terminal_wealth, second.terminal_wealth);
        assert_eq!(first.years_depleted, second.years_depleted);
        assert_eq!(first.guardrail_hits, second.guardrail_hits);
        assert_eq!(first.success_rate, second.success_rate);
        assert_eq!(first.wealth_bands, second.wealth_bands);
    }

    #[test]
    fn different_seeds_diverge() {
        let first = RetirementSimulator::new(noisy_params(50, 1)).unwrap().run();
        let second = RetirementSimulator::new(noisy_params(50, 2)).unwrap().run();
        assert_ne!(first.terminal_wealth, second.terminal_wealth);
    }

    #[test]
    fn fixed_spending_never_touches_guardrails() {
        let params = SimulationParams {
            // 20% of capital, far beyond the cut threshold if it applied.
            fixed_annual_spending: Some(200_000.0),
            ..quiet_params()
        };
        let results = RetirementSimulator::new(params).unwrap().run();
        assert!(results.guardrail_hits.iter().all(|&hits| hits == 0));
        for detail in p50_years(&results) {
            assert_eq!(detail.guardrail_action, GuardrailAction::None);
            assert!(!detail.floor_applied);
            assert!(!detail.ceiling_applied);
            assert_approx(detail.adjusted_base_spending, 200_000.0);
        }
    }

    #[test]
    fn fixed_zero_spending_is_honored_literally() {
        let params = SimulationParams {
            fixed_annual_spending: Some(0.0),
            ..quiet_params()
        };
        let results = RetirementSimulator::new(params).unwrap().run();
        assert_eq!(results.success_rate, 1.0);
        for detail in p50_years(&results) {
            assert_approx(detail.adjusted_base_spending, 0.0);
            assert_approx(detail.gross_withdrawal, 0.0);
        }
        assert_approx(results.terminal_wealth[0], 1_000_000.0);
    }

    #[test]
    fn depleted_trials_still_run_to_horizon() {
        let params = SimulationParams {
            start_capital: 100_000.0,
            fixed_annual_spending: Some(200_000.0),
            num_trials: 5,
            ..quiet_params()
        };
        let results = RetirementSimulator::new(params).unwrap().run();
        assert_eq!(results.success_rate, 0.0);
        for &depleted in &results.years_depleted {
            assert_eq!(depleted, 1);
        }
        for path in &results.wealth_paths {
            assert_eq!(path.len(), 11);
            assert_approx(path[10], 0.0);
        }
        assert_eq!(p50_years(&results).len(), 10);
    }

    #[test]
    fn trials_that_never_deplete_record_minus_one() {
        let results = RetirementSimulator::new(quiet_params()).unwrap().run();
        assert_eq!(results.years_depleted, vec![-1]);
        assert_eq!(results.success_rate, 1.0);
    }

    #[test]
    fn guardrail_cut_fires_above_upper_threshold() {
        let params = SimulationParams {
            initial_base_spending: Some(60_000.0),
            lower_guardrail: 0.028,
            upper_guardrail: 0.045,
            horizon_years: 1,
            ..quiet_params()
        };
        let results = RetirementSimulator::new(params).unwrap().run();
        let first = p50_years(&results)[0];
        assert_eq!(first.guardrail_action, GuardrailAction::Down);
        assert_approx(first.base_spending, 54_000.0);
        assert_eq!(results.guardrail_hits[0], 1);
    }

    #[test]
    fn guardrail_raise_fires_below_lower_threshold() {
        let params = SimulationParams {
            initial_base_spending: Some(20_000.0),
            lower_guardrail: 0.028,
            upper_guardrail: 0.045,
            horizon_years: 1,
            ..quiet_params()
        };
        let results = RetirementSimulator::new(params).unwrap().run();
        let first = p50_years(&results)[0];
        assert_eq!(first.guardrail_action, GuardrailAction::Up);
        assert_approx(first.base_spending, 22_000.0);
    }

    #[test]
    fn exact_threshold_triggers_nothing() {
        let params = SimulationParams {
            initial_base_spending: Some(45_000.0),
            lower_guardrail: 0.028,
            upper_guardrail: 0.045,
            horizon_years: 1,
            ..quiet_params()
        };
        let results = RetirementSimulator::new(params).unwrap().run();
        assert_eq!(
            p50_years(&results)[0].guardrail_action,
            GuardrailAction::None
        );
        assert_eq!(results.guardrail_hits[0], 0);
    }

    #[test]
    fn floor_props_up_spending_until_its_end_year() {
        let params = SimulationParams {
            initial_base_spending: Some(100_000.0),
            spending_floor_real: 160_000.0,
            floor_end_year: 2026,
            horizon_years: 2,
            ..quiet_params()
        };
        let results = RetirementSimulator::new(params).unwrap().run();
        let years = p50_years(&results);
        assert!(years[0].floor_applied);
        assert_approx(years[0].adjusted_base_spending, 160_000.0);
        // The trailing base carries unclamped, so the floor lapses with its
        // end year.
        assert!(!years[1].floor_applied);
        assert_approx(years[1].adjusted_base_spending, 100_000.0);
    }

    #[test]
    fn ceiling_caps_spending() {
        let params = SimulationParams {
            initial_base_spending: Some(300_000.0),
            spending_ceiling_real: 275_000.0,
            horizon_years: 1,
            ..quiet_params()
        };
        let results = RetirementSimulator::new(params).unwrap().run();
        let first = p50_years(&results)[0];
        assert!(first.ceiling_applied);
        assert_approx(first.adjusted_base_spending, 275_000.0);
    }

    #[test]
    fn inheritance_arrives_in_its_calendar_year() {
        let params = SimulationParams {
            fixed_annual_spending: Some(0.0),
            inherit_amount: 500_000.0,
            inherit_year: 2029,
            ..quiet_params()
        };
        let results = RetirementSimulator::new(params).unwrap().run();
        let path = &results.wealth_paths[0];
        assert_approx(path[3], 1_000_000.0);
        assert_approx(path[4], 1_500_000.0);
        assert_approx(path[10], 1_500_000.0);
    }

    #[test]
    fn income_flows_reduce_withdrawals() {
        let params = SimulationParams {
            fixed_annual_spending: Some(50_000.0),
            re_flow_enabled: true,
            re_flow_preset: ReFlowPreset::Ramp,
            re_flow_start_year: 2026,
            horizon_years: 1,
            ..quiet_params()
        };
        let results = RetirementSimulator::new(params).unwrap().run();
        let first = p50_years(&results)[0];
        assert_approx(first.re_income, 50_000.0);
        assert_approx(first.net_need, 0.0);
        assert_approx(first.gross_withdrawal, 0.0);
        assert_approx(first.end_assets, 1_000_000.0);
    }

    #[test]
    fn terminal_percentiles_are_ordered() {
        let results = RetirementSimulator::new(noisy_params(300, 9)).unwrap().run();
        assert!(results.summary.p10 <= results.summary.p50);
        assert!(results.summary.p50 <= results.summary.p90);
        let terminals: Vec<f64> = results
            .percentile_paths
            .iter()
            .map(|path| path.terminal_wealth)
            .collect();
        assert!(terminals[0] <= terminals[1]);
        assert!(terminals[1] <= terminals[2]);
    }

    #[test]
    fn wealth_bands_are_pointwise_ordered() {
        let results = RetirementSimulator::new(noisy_params(200, 11)).unwrap().run();
        let bands = &results.wealth_bands;
        assert_eq!(bands.p50.len(), 26);
        for year in 0..bands.p50.len() {
            assert!(bands.p10[year] <= bands.p50[year]);
            assert!(bands.p50[year] <= bands.p90[year]);
        }
    }

    #[test]
    fn percentile_path_replays_match_recorded_trials() {
        let results = RetirementSimulator::new(noisy_params(120, 3)).unwrap().run();
        for path in &results.percentile_paths {
            assert_eq!(
                path.terminal_wealth,
                results.terminal_wealth[path.trial_index]
            );
            assert_eq!(path.years.len(), 25);
            let last = path.years[path.years.len() - 1];
            assert_eq!(last.end_assets, path.terminal_wealth);
        }
    }

    #[test]
    fn success_rate_matches_depletion_vector() {
        let results = RetirementSimulator::new(noisy_params(250, 5)).unwrap().run();
        let never = results
            .years_depleted
            .iter()
            .filter(|&&year| year == -1)
            .count();
        assert_approx(results.success_rate, never as f64 / 250.0);
    }

    #[test]
    fn solver_failures_stay_zero_on_sane_inputs() {
        let results = RetirementSimulator::new(noisy_params(100, 13)).unwrap().run();
        assert_eq!(results.solver_failures, 0);
    }

    #[test]
    fn zero_trials_yield_empty_results() {
        let params = SimulationParams {
            num_trials: 0,
            ..quiet_params()
        };
        let results = RetirementSimulator::new(params).unwrap().run();
        assert!(results.terminal_wealth.is_empty());
        assert!(results.percentile_paths.is_empty());
        assert!(results.wealth_bands.p50.is_empty());
        assert_eq!(results.success_rate, 0.0);
    }

    #[test]
    fn zero_horizon_keeps_starting_capital() {
        let params = SimulationParams {
            horizon_years: 0,
            num_trials: 4,
            ..quiet_params()
        };
        let results = RetirementSimulator::new(params).unwrap().run();
        assert_eq!(results.success_rate, 1.0);
        for path in &results.wealth_paths {
            assert_eq!(path.len(), 1);
            assert_approx(path[0], 1_000_000.0);
        }
        assert_eq!(results.wealth_bands.p50.len(), 1);
    }

    #[test]
    fn percentile_interpolates_between_samples() {
        let mut values = vec![4.0, 1.0, 3.0, 2.0];
        assert_approx(percentile(&mut values, 50.0), 2.5);
        assert_approx(percentile(&mut values, 0.0), 1.0);
        assert_approx(percentile(&mut values, 100.0), 4.0);
        assert_approx(percentile(&mut [], 50.0), 0.0);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(24))]

        #[test]
        fn prop_results_stay_finite_and_consistent(
            seed in any::<u64>(),
            trials in 1usize..12,
            horizon in 1usize..15,
            capital_k in 100u32..8_000,
        ) {
            let params = SimulationParams {
                num_trials: trials,
                horizon_years: horizon,
                random_seed: Some(seed),
                start_capital: capital_k as f64 * 1_000.0,
                ..SimulationParams::default()
            };
            let results = RetirementSimulator::new(params).unwrap().run();
            prop_assert!(results.success_rate >= 0.0 && results.success_rate <= 1.0);
            prop_assert_eq!(results.terminal_wealth.len(), trials);
            for (path, &terminal) in results.wealth_paths.iter().zip(&results.terminal_wealth) {
                prop_assert_eq!(path.len(), horizon + 1);
                prop_assert!(path.iter().all(|w| w.is_finite() && *w >= 0.0));
                prop_assert_eq!(*path.last().unwrap(), terminal);
            }
            for &depleted in &results.years_depleted {
                prop_assert!(depleted == -1 || (depleted >= 1 && depleted <= horizon as i32));
            }
        }
    }
}
