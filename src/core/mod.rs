mod deterministic;
mod engine;
mod flows;
mod market;
mod tax;
mod types;

pub use deterministic::DeterministicProjector;
pub use engine::RetirementSimulator;
pub use flows::{
    college_topup_for_year, expense_total_for_year, income_total_for_year, re_income_for_year,
    social_security_for_year,
};
pub use market::{AssetReturns, AssetWeights, return_means_for_year, weights_for_year};
pub use tax::{
    DEFAULT_STANDARD_DEDUCTION, GrossSolve, calculate_tax, default_tax_brackets,
    effective_tax_rate, gross_up_withdrawal, marginal_tax_rate, solve_gross_withdrawal,
    solve_gross_withdrawal_detailed,
};
pub use types::{
    CashStream, DeterministicResults, FilingStatus, GuardrailAction, MarketRegime, ParamError,
    PercentilePath, ReFlowPreset, SimulationParams, SimulationResults, SsScenario, SummaryStats,
    WealthBands, YearDetail,
};
