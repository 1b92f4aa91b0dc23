use serde::Serialize;
use thiserror::Error;

use super::tax::{DEFAULT_STANDARD_DEDUCTION, default_tax_brackets};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid {field}: {reason}")]
pub struct ParamError {
    pub field: &'static str,
    pub reason: String,
}

impl ParamError {
    pub(crate) fn new(field: &'static str, reason: impl Into<String>) -> Self {
        Self {
            field,
            reason: reason.into(),
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum FilingStatus {
    MarriedJoint,
    Single,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum SsScenario {
    Conservative,
    Moderate,
    Optimistic,
    Custom,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ReFlowPreset {
    Ramp,
    Delayed,
    Custom,
}

/// Deterministic overlay on the baseline return means. Shock windows are
/// expressed as year offsets from the start of the projection.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum MarketRegime {
    Baseline,
    RecessionRecover,
    GrindLower,
    LateRecession,
    InflationShock,
    LongBear,
    TechBubble,
    Custom {
        shock_year: usize,
        shock_return: f64,
        shock_duration: usize,
        recovery_years: usize,
        recovery_return: f64,
    },
}

/// Recurring real-dollar flow covering `[start_year, start_year + years)`.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct CashStream {
    pub amount: f64,
    pub start_year: i32,
    pub years: u32,
}

impl CashStream {
    pub fn single_year(year: i32, amount: f64) -> Self {
        Self {
            amount,
            start_year: year,
            years: 1,
        }
    }

    pub fn contains(&self, year: i32) -> bool {
        year >= self.start_year && (year - self.start_year) < self.years as i32
    }
}

/// All dollar amounts are real (today's dollars); returns and volatilities
/// are annual real rates.
#[derive(Debug, Clone)]
pub struct SimulationParams {
    pub start_year: i32,
    pub horizon_years: usize,
    pub num_trials: usize,
    pub random_seed: Option<u64>,
    pub retirement_age: u32,

    pub start_capital: f64,
    pub w_equity: f64,
    pub w_bonds: f64,
    pub w_real_estate: f64,
    pub w_cash: f64,
    pub glide_path_enabled: bool,
    pub equity_reduction_per_year: f64,

    pub equity_mean: f64,
    pub equity_vol: f64,
    pub bonds_mean: f64,
    pub bonds_vol: f64,
    pub real_estate_mean: f64,
    pub real_estate_vol: f64,
    pub cash_mean: f64,
    pub cash_vol: f64,
    pub regime: MarketRegime,

    pub cape_now: f64,
    pub initial_base_spending: Option<f64>,
    pub fixed_annual_spending: Option<f64>,
    pub lower_guardrail: f64,
    pub upper_guardrail: f64,
    pub guardrail_adjustment: f64,
    pub spending_floor_real: f64,
    pub spending_ceiling_real: f64,
    pub floor_end_year: i32,

    pub expense_streams: Vec<CashStream>,
    pub income_streams: Vec<CashStream>,

    pub re_flow_enabled: bool,
    pub re_flow_preset: ReFlowPreset,
    pub re_flow_start_year: i32,
    pub re_flow_delay_years: u32,
    pub re_flow_year1_amount: f64,
    pub re_flow_year2_amount: f64,
    pub re_flow_steady_amount: f64,

    pub college_enabled: bool,
    pub college_base_amount: f64,
    pub college_start_year: i32,
    pub college_end_year: i32,
    pub college_growth_real: f64,

    pub inherit_amount: f64,
    pub inherit_year: i32,

    pub social_security_enabled: bool,
    pub ss_annual_benefit: f64,
    pub ss_start_age: u32,
    pub spouse_ss_enabled: bool,
    pub spouse_ss_annual_benefit: f64,
    pub spouse_ss_start_age: u32,
    pub ss_scenario: SsScenario,
    pub ss_custom_reduction: f64,
    pub ss_reduction_start_year: i32,

    pub filing_status: FilingStatus,
    pub standard_deduction: f64,
    pub tax_brackets: Vec<(f64, f64)>,
}

impl Default for SimulationParams {
    fn default() -> Self {
        Self {
            start_year: 2026,
            horizon_years: 50,
            num_trials: 10_000,
            random_seed: None,
            retirement_age: 65,

            start_capital: 7_550_000.0,
            w_equity: 0.60,
            w_bonds: 0.20,
            w_real_estate: 0.15,
            w_cash: 0.05,
            glide_path_enabled: false,
            equity_reduction_per_year: 0.005,

            equity_mean: 0.05,
            equity_vol: 0.18,
            bonds_mean: 0.015,
            bonds_vol: 0.07,
            real_estate_mean: 0.01,
            real_estate_vol: 0.10,
            cash_mean: 0.0,
            cash_vol: 0.0001,
            regime: MarketRegime::Baseline,

            cape_now: 38.5,
            initial_base_spending: None,
            fixed_annual_spending: None,
            lower_guardrail: 0.028,
            upper_guardrail: 0.045,
            guardrail_adjustment: 0.10,
            spending_floor_real: 160_000.0,
            spending_ceiling_real: 275_000.0,
            floor_end_year: 2041,

            expense_streams: Vec::new(),
            income_streams: Vec::new(),

            re_flow_enabled: true,
            re_flow_preset: ReFlowPreset::Ramp,
            re_flow_start_year: 2026,
            re_flow_delay_years: 0,
            re_flow_year1_amount: 50_000.0,
            re_flow_year2_amount: 60_000.0,
            re_flow_steady_amount: 75_000.0,

            college_enabled: true,
            college_base_amount: 100_000.0,
            college_start_year: 2032,
            college_end_year: 2041,
            college_growth_real: 0.013,

            inherit_amount: 1_500_000.0,
            inherit_year: 2040,

            social_security_enabled: true,
            ss_annual_benefit: 40_000.0,
            ss_start_age: 67,
            spouse_ss_enabled: false,
            spouse_ss_annual_benefit: 30_000.0,
            spouse_ss_start_age: 67,
            ss_scenario: SsScenario::Moderate,
            ss_custom_reduction: 0.10,
            ss_reduction_start_year: 2034,

            filing_status: FilingStatus::MarriedJoint,
            standard_deduction: DEFAULT_STANDARD_DEDUCTION,
            tax_brackets: default_tax_brackets(FilingStatus::MarriedJoint),
        }
    }
}

fn require_finite(field: &'static str, value: f64) -> Result<(), ParamError> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(ParamError::new(field, "must be finite"))
    }
}

fn require_non_negative(field: &'static str, value: f64) -> Result<(), ParamError> {
    require_finite(field, value)?;
    if value < 0.0 {
        return Err(ParamError::new(field, "must not be negative"));
    }
    Ok(())
}

impl SimulationParams {
    pub fn validate(&self) -> Result<(), ParamError> {
        require_non_negative("start_capital", self.start_capital)?;

        for (field, weight) in [
            ("w_equity", self.w_equity),
            ("w_bonds", self.w_bonds),
            ("w_real_estate", self.w_real_estate),
            ("w_cash", self.w_cash),
        ] {
            require_non_negative(field, weight)?;
        }
        let weight_sum = self.w_equity + self.w_bonds + self.w_real_estate + self.w_cash;
        if (weight_sum - 1.0).abs() > 1e-6 {
            return Err(ParamError::new(
                "weights",
                format!("must sum to 1.0, got {weight_sum}"),
            ));
        }
        require_non_negative("equity_reduction_per_year", self.equity_reduction_per_year)?;

        for (field, mean) in [
            ("equity_mean", self.equity_mean),
            ("bonds_mean", self.bonds_mean),
            ("real_estate_mean", self.real_estate_mean),
            ("cash_mean", self.cash_mean),
        ] {
            require_finite(field, mean)?;
        }
        for (field, vol) in [
            ("equity_vol", self.equity_vol),
            ("bonds_vol", self.bonds_vol),
            ("real_estate_vol", self.real_estate_vol),
            ("cash_vol", self.cash_vol),
        ] {
            require_non_negative(field, vol)?;
        }
        if let MarketRegime::Custom {
            shock_return,
            recovery_return,
            ..
        } = self.regime
        {
            require_finite("shock_return", shock_return)?;
            require_finite("recovery_return", recovery_return)?;
        }

        match (self.fixed_annual_spending, self.initial_base_spending) {
            (Some(fixed), _) => require_non_negative("fixed_annual_spending", fixed)?,
            (None, Some(initial)) => require_non_negative("initial_base_spending", initial)?,
            (None, None) => {
                require_finite("cape_now", self.cape_now)?;
                if self.cape_now <= 0.0 {
                    return Err(ParamError::new("cape_now", "must be positive"));
                }
            }
        }

        require_non_negative("lower_guardrail", self.lower_guardrail)?;
        require_non_negative("upper_guardrail", self.upper_guardrail)?;
        if self.upper_guardrail < self.lower_guardrail {
            return Err(ParamError::new(
                "upper_guardrail",
                "must not be below lower_guardrail",
            ));
        }
        require_non_negative("guardrail_adjustment", self.guardrail_adjustment)?;
        if self.guardrail_adjustment >= 1.0 {
            return Err(ParamError::new("guardrail_adjustment", "must be below 1.0"));
        }
        require_non_negative("spending_floor_real", self.spending_floor_real)?;
        require_non_negative("spending_ceiling_real", self.spending_ceiling_real)?;
        if self.spending_ceiling_real < self.spending_floor_real {
            return Err(ParamError::new(
                "spending_ceiling_real",
                "must not be below spending_floor_real",
            ));
        }

        for stream in &self.expense_streams {
            require_non_negative("expense_streams", stream.amount)?;
        }
        for stream in &self.income_streams {
            require_non_negative("income_streams", stream.amount)?;
        }

        for (field, amount) in [
            ("re_flow_year1_amount", self.re_flow_year1_amount),
            ("re_flow_year2_amount", self.re_flow_year2_amount),
            ("re_flow_steady_amount", self.re_flow_steady_amount),
        ] {
            require_non_negative(field, amount)?;
        }

        if self.college_enabled {
            require_non_negative("college_base_amount", self.college_base_amount)?;
            require_finite("college_growth_real", self.college_growth_real)?;
            if self.college_end_year < self.college_start_year {
                return Err(ParamError::new(
                    "college_end_year",
                    "must not precede college_start_year",
                ));
            }
        }
        require_non_negative("inherit_amount", self.inherit_amount)?;

        require_non_negative("ss_annual_benefit", self.ss_annual_benefit)?;
        require_non_negative("spouse_ss_annual_benefit", self.spouse_ss_annual_benefit)?;
        require_non_negative("ss_custom_reduction", self.ss_custom_reduction)?;
        if self.ss_custom_reduction > 1.0 {
            return Err(ParamError::new("ss_custom_reduction", "must not exceed 1.0"));
        }

        require_non_negative("standard_deduction", self.standard_deduction)?;
        if self.tax_brackets.is_empty() {
            return Err(ParamError::new("tax_brackets", "must not be empty"));
        }
        let mut sorted = self.tax_brackets.clone();
        sorted.sort_by(|a, b| a.0.total_cmp(&b.0));
        if sorted[0].0 != 0.0 {
            return Err(ParamError::new("tax_brackets", "first floor must be 0"));
        }
        for window in sorted.windows(2) {
            if window[1].0 <= window[0].0 {
                return Err(ParamError::new(
                    "tax_brackets",
                    "floors must be strictly increasing",
                ));
            }
        }
        for &(floor, rate) in &sorted {
            require_non_negative("tax_brackets", floor)?;
            require_non_negative("tax_brackets", rate)?;
        }

        Ok(())
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum GuardrailAction {
    None,
    Up,
    Down,
}

#[derive(Copy, Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct YearDetail {
    pub year: i32,
    pub start_assets: f64,
    pub base_spending: f64,
    pub guardrail_action: GuardrailAction,
    pub floor_applied: bool,
    pub ceiling_applied: bool,
    pub adjusted_base_spending: f64,
    pub college_topup: f64,
    pub expense_total: f64,
    pub re_income: f64,
    pub other_income: f64,
    pub ss_income: f64,
    pub net_need: f64,
    pub gross_withdrawal: f64,
    pub taxable_income: f64,
    pub taxes: f64,
    pub growth: f64,
    pub inheritance: f64,
    pub end_assets: f64,
    pub withdrawal_rate: f64,
    pub w_equity: f64,
    pub w_bonds: f64,
    pub w_real_estate: f64,
    pub w_cash: f64,
}

/// Year-by-year detail for the trial whose terminal wealth sits at the given
/// percentile of the run.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PercentilePath {
    pub percentile: u8,
    pub trial_index: usize,
    pub terminal_wealth: f64,
    pub years: Vec<YearDetail>,
}

/// Point-wise wealth percentiles per year offset; index 0 is starting wealth.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WealthBands {
    pub p10: Vec<f64>,
    pub p50: Vec<f64>,
    pub p90: Vec<f64>,
}

#[derive(Copy, Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryStats {
    pub mean: f64,
    pub p10: f64,
    pub p50: f64,
    pub p90: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationResults {
    pub terminal_wealth: Vec<f64>,
    pub wealth_paths: Vec<Vec<f64>>,
    pub guardrail_hits: Vec<u32>,
    /// 1-based year offset a trial first hit zero, -1 when it never did.
    pub years_depleted: Vec<i32>,
    pub success_rate: f64,
    pub percentile_paths: Vec<PercentilePath>,
    pub wealth_bands: WealthBands,
    pub summary: SummaryStats,
    pub solver_failures: u64,
}

/// Single path under expected returns, no sampling.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeterministicResults {
    pub wealth_path: Vec<f64>,
    pub spending_path: Vec<f64>,
    pub withdrawal_path: Vec<f64>,
    pub tax_path: Vec<f64>,
    pub guardrail_hits: u32,
    pub years: Vec<YearDetail>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_params_are_valid() {
        assert!(SimulationParams::default().validate().is_ok());
    }

    #[test]
    fn rejects_weights_not_summing_to_one() {
        let params = SimulationParams {
            w_equity: 0.60,
            w_bonds: 0.30,
            w_real_estate: 0.15,
            w_cash: 0.05,
            ..SimulationParams::default()
        };
        let err = params.validate().unwrap_err();
        assert_eq!(err.field, "weights");
    }

    #[test]
    fn rejects_negative_volatility() {
        let params = SimulationParams {
            bonds_vol: -0.01,
            ..SimulationParams::default()
        };
        assert_eq!(params.validate().unwrap_err().field, "bonds_vol");
    }

    #[test]
    fn rejects_missing_cape_when_no_spending_override() {
        let params = SimulationParams {
            cape_now: 0.0,
            initial_base_spending: None,
            fixed_annual_spending: None,
            ..SimulationParams::default()
        };
        assert_eq!(params.validate().unwrap_err().field, "cape_now");
    }

    #[test]
    fn fixed_spending_makes_cape_optional() {
        let params = SimulationParams {
            cape_now: 0.0,
            fixed_annual_spending: Some(180_000.0),
            ..SimulationParams::default()
        };
        assert!(params.validate().is_ok());
    }

    #[test]
    fn rejects_inverted_guardrails() {
        let params = SimulationParams {
            lower_guardrail: 0.05,
            upper_guardrail: 0.03,
            ..SimulationParams::default()
        };
        assert_eq!(params.validate().unwrap_err().field, "upper_guardrail");
    }

    #[test]
    fn rejects_ceiling_below_floor() {
        let params = SimulationParams {
            spending_floor_real: 200_000.0,
            spending_ceiling_real: 150_000.0,
            ..SimulationParams::default()
        };
        assert_eq!(
            params.validate().unwrap_err().field,
            "spending_ceiling_real"
        );
    }

    #[test]
    fn rejects_empty_brackets() {
        let params = SimulationParams {
            tax_brackets: vec![],
            ..SimulationParams::default()
        };
        assert_eq!(params.validate().unwrap_err().field, "tax_brackets");
    }

    #[test]
    fn rejects_brackets_not_anchored_at_zero() {
        let params = SimulationParams {
            tax_brackets: vec![(10_000.0, 0.10), (50_000.0, 0.22)],
            ..SimulationParams::default()
        };
        assert_eq!(params.validate().unwrap_err().field, "tax_brackets");
    }

    #[test]
    fn rejects_duplicate_bracket_floors() {
        let params = SimulationParams {
            tax_brackets: vec![(0.0, 0.10), (50_000.0, 0.22), (50_000.0, 0.24)],
            ..SimulationParams::default()
        };
        assert_eq!(params.validate().unwrap_err().field, "tax_brackets");
    }

    #[test]
    fn rejects_adjustment_of_one_or_more() {
        let params = SimulationParams {
            guardrail_adjustment: 1.0,
            ..SimulationParams::default()
        };
        assert_eq!(params.validate().unwrap_err().field, "guardrail_adjustment");
    }

    #[test]
    fn stream_contains_exactly_its_window() {
        let stream = CashStream {
            amount: 50_000.0,
            start_year: 2033,
            years: 1,
        };
        assert!(stream.contains(2033));
        assert!(!stream.contains(2032));
        assert!(!stream.contains(2034));

        let multi = CashStream {
            amount: 12_000.0,
            start_year: 2030,
            years: 5,
        };
        assert!(multi.contains(2030));
        assert!(multi.contains(2034));
        assert!(!multi.contains(2035));
    }

    #[test]
    fn single_year_stream_spans_one_year() {
        let stream = CashStream::single_year(2040, 25_000.0);
        assert_eq!(stream.years, 1);
        assert!(stream.contains(2040));
        assert!(!stream.contains(2041));
    }
}
