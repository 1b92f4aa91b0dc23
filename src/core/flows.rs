use super::types::{CashStream, ReFlowPreset, SimulationParams, SsScenario};

const RAMP_YEAR1: f64 = 50_000.0;
const RAMP_YEAR2: f64 = 60_000.0;
const RAMP_STEADY: f64 = 75_000.0;
const DELAYED_START_OFFSET: i32 = 5;
const CONSERVATIVE_SS_REDUCTION: f64 = 0.19;

/// Net rental income for a calendar year under the configured preset.
pub fn re_income_for_year(params: &SimulationParams, year: i32) -> f64 {
    if !params.re_flow_enabled {
        return 0.0;
    }
    match params.re_flow_preset {
        ReFlowPreset::Ramp => match year - params.re_flow_start_year {
            offset if offset < 0 => 0.0,
            0 => RAMP_YEAR1,
            1 => RAMP_YEAR2,
            _ => RAMP_STEADY,
        },
        ReFlowPreset::Delayed => match year - params.re_flow_start_year {
            offset if offset < DELAYED_START_OFFSET => 0.0,
            offset if offset == DELAYED_START_OFFSET => RAMP_YEAR1,
            offset if offset == DELAYED_START_OFFSET + 1 => RAMP_YEAR2,
            _ => RAMP_STEADY,
        },
        ReFlowPreset::Custom => {
            let first_year = params.re_flow_start_year + params.re_flow_delay_years as i32;
            match year - first_year {
                offset if offset < 0 => 0.0,
                0 => params.re_flow_year1_amount,
                1 => params.re_flow_year2_amount,
                _ => params.re_flow_steady_amount,
            }
        }
    }
}

/// College top-up, grown from the base amount while the window is open.
pub fn college_topup_for_year(params: &SimulationParams, year: i32) -> f64 {
    if !params.college_enabled
        || year < params.college_start_year
        || year > params.college_end_year
    {
        return 0.0;
    }
    let years_in = year - params.college_start_year;
    params.college_base_amount * (1.0 + params.college_growth_real).powi(years_in)
}

fn stream_total(streams: &[CashStream], year: i32) -> f64 {
    streams
        .iter()
        .filter(|stream| stream.contains(year))
        .map(|stream| stream.amount)
        .sum()
}

pub fn expense_total_for_year(params: &SimulationParams, year: i32) -> f64 {
    stream_total(&params.expense_streams, year)
}

pub fn income_total_for_year(params: &SimulationParams, year: i32) -> f64 {
    stream_total(&params.income_streams, year)
}

fn scenario_reduction(params: &SimulationParams, year: i32) -> f64 {
    if year < params.ss_reduction_start_year {
        return 0.0;
    }
    match params.ss_scenario {
        SsScenario::Conservative => CONSERVATIVE_SS_REDUCTION,
        SsScenario::Moderate => {
            let years_since = (year - params.ss_reduction_start_year) as f64;
            (0.05 + 0.01 * years_since).min(0.10)
        }
        SsScenario::Optimistic => 0.0,
        SsScenario::Custom => params.ss_custom_reduction,
    }
}

fn beneficiary_benefit(
    params: &SimulationParams,
    year: i32,
    claim_age: u32,
    annual_benefit: f64,
) -> f64 {
    // Both beneficiaries share the retiree's age timeline.
    let age_at_year = params.retirement_age as i64 + (year - params.start_year) as i64;
    if age_at_year < claim_age as i64 {
        return 0.0;
    }
    annual_benefit * (1.0 - scenario_reduction(params, year))
}

/// Combined household benefit for a calendar year. Each beneficiary starts
/// at their own claim age; the haircut scenario is shared.
pub fn social_security_for_year(params: &SimulationParams, year: i32) -> f64 {
    let mut total = 0.0;
    if params.social_security_enabled {
        total += beneficiary_benefit(params, year, params.ss_start_age, params.ss_annual_benefit);
    }
    if params.spouse_ss_enabled {
        total += beneficiary_benefit(
            params,
            year,
            params.spouse_ss_start_age,
            params.spouse_ss_annual_benefit,
        );
    }
    total
}
