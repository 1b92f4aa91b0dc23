use super::engine::{TrialState, simulate_year};
use super::market::{return_means_for_year, weights_for_year};
use super::types::{DeterministicResults, ParamError, SimulationParams};

/// Runs the withdrawal pipeline once under expected returns instead of
/// sampled ones. Useful as a smooth reference path next to the simulated
/// bands.
pub struct DeterministicProjector {
    params: SimulationParams,
}

impl DeterministicProjector {
    pub fn new(params: SimulationParams) -> Result<Self, ParamError> {
        params.validate()?;
        Ok(Self { params })
    }

    pub fn run(&self) -> DeterministicResults {
        let params = &self.params;
        let mut state = TrialState::new(params);
        let mut wealth_path = Vec::with_capacity(params.horizon_years + 1);
        wealth_path.push(state.portfolio);
        let mut spending_path = Vec::with_capacity(params.horizon_years);
        let mut withdrawal_path = Vec::with_capacity(params.horizon_years);
        let mut tax_path = Vec::with_capacity(params.horizon_years);
        let mut years = Vec::with_capacity(params.horizon_years);

        for year_idx in 0..params.horizon_years {
            let weights = weights_for_year(params, year_idx);
            let means = return_means_for_year(params, year_idx);
            let step = simulate_year(params, &mut state, year_idx, weights, weights.dot(means));
            wealth_path.push(state.portfolio);
            spending_path.push(
                step.detail.adjusted_base_spending
                    + step.detail.college_topup
                    + step.detail.expense_total,
            );
            withdrawal_path.push(step.detail.gross_withdrawal);
            tax_path.push(step.detail.taxes);
            years.push(step.detail);
        }

        DeterministicResults {
            wealth_path,
            spending_path,
            withdrawal_path,
            tax_path,
            guardrail_hits: state.guardrail_hits,
            years,
        }
    }
}
