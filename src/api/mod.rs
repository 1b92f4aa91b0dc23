use std::fs;
use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::Context;
use axum::{
    Router,
    extract::{Json, Query},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use clap::{Parser, ValueEnum};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;

use crate::core::{
    CashStream, DeterministicProjector, DeterministicResults, FilingStatus, MarketRegime,
    PercentilePath, ReFlowPreset, RetirementSimulator, SimulationParams, SimulationResults,
    SsScenario, SummaryStats, WealthBands, default_tax_brackets,
};

// Custom-regime fallbacks when the payload selects "custom" without
// spelling out the shock shape.
const DEFAULT_SHOCK_YEAR: usize = 0;
const DEFAULT_SHOCK_RETURN: f64 = -0.20;
const DEFAULT_SHOCK_DURATION: usize = 1;
const DEFAULT_RECOVERY_YEARS: usize = 2;
const DEFAULT_RECOVERY_RETURN: f64 = 0.02;

#[derive(Copy, Clone, Debug, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case")]
enum ApiRegime {
    Baseline,
    #[serde(alias = "recessionRecover", alias = "recession_recover")]
    RecessionRecover,
    #[serde(alias = "grindLower", alias = "grind_lower")]
    GrindLower,
    #[serde(alias = "lateRecession", alias = "late_recession")]
    LateRecession,
    #[serde(alias = "inflationShock", alias = "inflation_shock")]
    InflationShock,
    #[serde(alias = "longBear", alias = "long_bear")]
    LongBear,
    #[serde(alias = "techBubble", alias = "tech_bubble")]
    TechBubble,
    Custom,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case")]
enum ApiReFlowPreset {
    Ramp,
    Delayed,
    Custom,
}

impl From<ApiReFlowPreset> for ReFlowPreset {
    fn from(value: ApiReFlowPreset) -> Self {
        match value {
            ApiReFlowPreset::Ramp => ReFlowPreset::Ramp,
            ApiReFlowPreset::Delayed => ReFlowPreset::Delayed,
            ApiReFlowPreset::Custom => ReFlowPreset::Custom,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case")]
enum ApiSsScenario {
    Conservative,
    Moderate,
    Optimistic,
    Custom,
}

impl From<ApiSsScenario> for SsScenario {
    fn from(value: ApiSsScenario) -> Self {
        match value {
            ApiSsScenario::Conservative => SsScenario::Conservative,
            ApiSsScenario::Moderate => SsScenario::Moderate,
            ApiSsScenario::Optimistic => SsScenario::Optimistic,
            ApiSsScenario::Custom => SsScenario::Custom,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case")]
enum ApiFilingStatus {
    #[serde(
        alias = "MFJ",
        alias = "mfj",
        alias = "marriedJoint",
        alias = "married_joint"
    )]
    MarriedJoint,
    #[serde(alias = "Single")]
    Single,
}

impl From<ApiFilingStatus> for FilingStatus {
    fn from(value: ApiFilingStatus) -> Self {
        match value {
            ApiFilingStatus::MarriedJoint => FilingStatus::MarriedJoint,
            ApiFilingStatus::Single => FilingStatus::Single,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StreamPayload {
    amount: f64,
    start_year: Option<i32>,
    years: Option<u32>,
    /// Legacy single-year form.
    year: Option<i32>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct SimulatePayload {
    start_year: Option<i32>,
    #[serde(alias = "years")]
    horizon_years: Option<usize>,
    #[serde(alias = "numSims", alias = "num_sims")]
    num_trials: Option<usize>,
    #[serde(alias = "seed")]
    random_seed: Option<u64>,
    retirement_age: Option<u32>,

    start_capital: Option<f64>,
    w_equity: Option<f64>,
    w_bonds: Option<f64>,
    w_real_estate: Option<f64>,
    w_cash: Option<f64>,
    glide_path_enabled: Option<bool>,
    equity_reduction_per_year: Option<f64>,

    equity_mean: Option<f64>,
    equity_vol: Option<f64>,
    bonds_mean: Option<f64>,
    bonds_vol: Option<f64>,
    real_estate_mean: Option<f64>,
    real_estate_vol: Option<f64>,
    cash_mean: Option<f64>,
    cash_vol: Option<f64>,
    regime: Option<ApiRegime>,
    custom_equity_shock_year: Option<usize>,
    custom_equity_shock_return: Option<f64>,
    custom_shock_duration: Option<usize>,
    custom_recovery_years: Option<usize>,
    custom_recovery_equity_return: Option<f64>,

    #[serde(alias = "cape")]
    cape_now: Option<f64>,
    initial_base_spending: Option<f64>,
    fixed_annual_spending: Option<f64>,
    lower_guardrail: Option<f64>,
    upper_guardrail: Option<f64>,
    #[serde(alias = "adjustmentPct")]
    guardrail_adjustment: Option<f64>,
    #[serde(alias = "spendingFloor")]
    spending_floor_real: Option<f64>,
    #[serde(alias = "spendingCeiling")]
    spending_ceiling_real: Option<f64>,
    floor_end_year: Option<i32>,

    #[serde(alias = "oneTimes", alias = "one_times")]
    expense_streams: Option<Vec<StreamPayload>>,
    #[serde(alias = "otherIncomeStreams")]
    income_streams: Option<Vec<StreamPayload>>,
    other_income_amount: Option<f64>,
    other_income_start_year: Option<i32>,
    other_income_years: Option<u32>,

    re_flow_enabled: Option<bool>,
    re_flow_preset: Option<ApiReFlowPreset>,
    re_flow_start_year: Option<i32>,
    re_flow_delay_years: Option<u32>,
    re_flow_year1_amount: Option<f64>,
    re_flow_year2_amount: Option<f64>,
    re_flow_steady_amount: Option<f64>,

    college_enabled: Option<bool>,
    college_base_amount: Option<f64>,
    college_start_year: Option<i32>,
    college_end_year: Option<i32>,
    #[serde(alias = "collegeGrowth")]
    college_growth_real: Option<f64>,

    inherit_amount: Option<f64>,
    inherit_year: Option<i32>,

    social_security_enabled: Option<bool>,
    ss_annual_benefit: Option<f64>,
    ss_start_age: Option<u32>,
    spouse_ss_enabled: Option<bool>,
    spouse_ss_annual_benefit: Option<f64>,
    spouse_ss_start_age: Option<u32>,
    #[serde(alias = "ssBenefitScenario", alias = "ss_benefit_scenario")]
    ss_scenario: Option<ApiSsScenario>,
    ss_custom_reduction: Option<f64>,
    ss_reduction_start_year: Option<i32>,

    filing_status: Option<ApiFilingStatus>,
    standard_deduction: Option<f64>,
    tax_brackets: Option<Vec<(f64, f64)>>,

    deterministic: Option<bool>,
}

#[derive(Debug)]
struct SimulateRequest {
    params: SimulationParams,
    deterministic: bool,
}

fn convert_streams(field: &str, streams: &[StreamPayload]) -> Result<Vec<CashStream>, String> {
    streams
        .iter()
        .enumerate()
        .map(|(idx, stream)| match (stream.start_year, stream.year) {
            (Some(start_year), _) => Ok(CashStream {
                amount: stream.amount,
                start_year,
                years: stream.years.unwrap_or(1),
            }),
            (None, Some(year)) => Ok(CashStream::single_year(year, stream.amount)),
            (None, None) => Err(format!("{field}[{idx}] needs a startYear or year")),
        })
        .collect()
}

fn regime_from_payload(payload: &SimulatePayload, regime: ApiRegime) -> MarketRegime {
    match regime {
        ApiRegime::Baseline => MarketRegime::Baseline,
        ApiRegime::RecessionRecover => MarketRegime::RecessionRecover,
        ApiRegime::GrindLower => MarketRegime::GrindLower,
        ApiRegime::LateRecession => MarketRegime::LateRecession,
        ApiRegime::InflationShock => MarketRegime::InflationShock,
        ApiRegime::LongBear => MarketRegime::LongBear,
        ApiRegime::TechBubble => MarketRegime::TechBubble,
        ApiRegime::Custom => MarketRegime::Custom {
            shock_year: payload.custom_equity_shock_year.unwrap_or(DEFAULT_SHOCK_YEAR),
            shock_return: payload
                .custom_equity_shock_return
                .unwrap_or(DEFAULT_SHOCK_RETURN),
            shock_duration: payload
                .custom_shock_duration
                .unwrap_or(DEFAULT_SHOCK_DURATION),
            recovery_years: payload
                .custom_recovery_years
                .unwrap_or(DEFAULT_RECOVERY_YEARS),
            recovery_return: payload
                .custom_recovery_equity_return
                .unwrap_or(DEFAULT_RECOVERY_RETURN),
        },
    }
}

fn simulate_request_from_payload(payload: SimulatePayload) -> Result<SimulateRequest, String> {
    let mut params = SimulationParams::default();

    if let Some(v) = payload.start_year {
        params.start_year = v;
    }
    if let Some(v) = payload.horizon_years {
        params.horizon_years = v;
    }
    if let Some(v) = payload.num_trials {
        params.num_trials = v;
    }
    if let Some(v) = payload.random_seed {
        params.random_seed = Some(v);
    }
    if let Some(v) = payload.retirement_age {
        params.retirement_age = v;
    }
    if let Some(v) = payload.start_capital {
        params.start_capital = v;
    }
    if let Some(v) = payload.w_equity {
        params.w_equity = v;
    }
    if let Some(v) = payload.w_bonds {
        params.w_bonds = v;
    }
    if let Some(v) = payload.w_real_estate {
        params.w_real_estate = v;
    }
    if let Some(v) = payload.w_cash {
        params.w_cash = v;
    }
    if let Some(v) = payload.glide_path_enabled {
        params.glide_path_enabled = v;
    }
    if let Some(v) = payload.equity_reduction_per_year {
        params.equity_reduction_per_year = v;
    }
    if let Some(v) = payload.equity_mean {
        params.equity_mean = v;
    }
    if let Some(v) = payload.equity_vol {
        params.equity_vol = v;
    }
    if let Some(v) = payload.bonds_mean {
        params.bonds_mean = v;
    }
    if let Some(v) = payload.bonds_vol {
        params.bonds_vol = v;
    }
    if let Some(v) = payload.real_estate_mean {
        params.real_estate_mean = v;
    }
    if let Some(v) = payload.real_estate_vol {
        params.real_estate_vol = v;
    }
    if let Some(v) = payload.cash_mean {
        params.cash_mean = v;
    }
    if let Some(v) = payload.cash_vol {
        params.cash_vol = v;
    }
    if let Some(v) = payload.cape_now {
        params.cape_now = v;
    }
    if let Some(v) = payload.initial_base_spending {
        params.initial_base_spending = Some(v);
    }
    if let Some(v) = payload.fixed_annual_spending {
        params.fixed_annual_spending = Some(v);
    }
    if let Some(v) = payload.lower_guardrail {
        params.lower_guardrail = v;
    }
    if let Some(v) = payload.upper_guardrail {
        params.upper_guardrail = v;
    }
    if let Some(v) = payload.guardrail_adjustment {
        params.guardrail_adjustment = v;
    }
    if let Some(v) = payload.spending_floor_real {
        params.spending_floor_real = v;
    }
    if let Some(v) = payload.spending_ceiling_real {
        params.spending_ceiling_real = v;
    }
    if let Some(v) = payload.floor_end_year {
        params.floor_end_year = v;
    }
    if let Some(v) = payload.re_flow_enabled {
        params.re_flow_enabled = v;
    }
    if let Some(v) = payload.re_flow_preset {
        params.re_flow_preset = v.into();
    }
    if let Some(v) = payload.re_flow_start_year {
        params.re_flow_start_year = v;
    }
    if let Some(v) = payload.re_flow_delay_years {
        params.re_flow_delay_years = v;
    }
    if let Some(v) = payload.re_flow_year1_amount {
        params.re_flow_year1_amount = v;
    }
    if let Some(v) = payload.re_flow_year2_amount {
        params.re_flow_year2_amount = v;
    }
    if let Some(v) = payload.re_flow_steady_amount {
        params.re_flow_steady_amount = v;
    }
    if let Some(v) = payload.college_enabled {
        params.college_enabled = v;
    }
    if let Some(v) = payload.college_base_amount {
        params.college_base_amount = v;
    }
    if let Some(v) = payload.college_start_year {
        params.college_start_year = v;
    }
    if let Some(v) = payload.college_end_year {
        params.college_end_year = v;
    }
    if let Some(v) = payload.college_growth_real {
        params.college_growth_real = v;
    }
    if let Some(v) = payload.inherit_amount {
        params.inherit_amount = v;
    }
    if let Some(v) = payload.inherit_year {
        params.inherit_year = v;
    }
    if let Some(v) = payload.social_security_enabled {
        params.social_security_enabled = v;
    }
    if let Some(v) = payload.ss_annual_benefit {
        params.ss_annual_benefit = v;
    }
    if let Some(v) = payload.ss_start_age {
        params.ss_start_age = v;
    }
    if let Some(v) = payload.spouse_ss_enabled {
        params.spouse_ss_enabled = v;
    }
    if let Some(v) = payload.spouse_ss_annual_benefit {
        params.spouse_ss_annual_benefit = v;
    }
    if let Some(v) = payload.spouse_ss_start_age {
        params.spouse_ss_start_age = v;
    }
    if let Some(v) = payload.ss_scenario {
        params.ss_scenario = v.into();
    }
    if let Some(v) = payload.ss_custom_reduction {
        params.ss_custom_reduction = v;
    }
    if let Some(v) = payload.ss_reduction_start_year {
        params.ss_reduction_start_year = v;
    }
    if let Some(v) = payload.filing_status {
        params.filing_status = v.into();
        params.tax_brackets = default_tax_brackets(params.filing_status);
    }
    if let Some(v) = payload.standard_deduction {
        params.standard_deduction = v;
    }
    if let Some(v) = &payload.tax_brackets {
        params.tax_brackets = v.clone();
    }
    if let Some(streams) = &payload.expense_streams {
        params.expense_streams = convert_streams("expenseStreams", streams)?;
    }
    if let Some(streams) = &payload.income_streams {
        params.income_streams = convert_streams("incomeStreams", streams)?;
    }
    // Legacy single-window income fields append one more stream.
    if let Some(amount) = payload.other_income_amount {
        let years = payload.other_income_years.unwrap_or(0);
        if years > 0 {
            params.income_streams.push(CashStream {
                amount,
                start_year: payload
                    .other_income_start_year
                    .unwrap_or(params.start_year),
                years,
            });
        }
    }
    if let Some(regime) = payload.regime {
        params.regime = regime_from_payload(&payload, regime);
    }

    params.validate().map_err(|e| e.to_string())?;
    Ok(SimulateRequest {
        params,
        deterministic: payload.deterministic.unwrap_or(false),
    })
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SimulateResponse {
    trials: usize,
    horizon_years: usize,
    start_year: i32,
    success_rate: f64,
    depleted_trials: usize,
    avg_guardrail_hits: f64,
    solver_failures: u64,
    summary: SummaryStats,
    wealth_bands: WealthBands,
    percentile_paths: Vec<PercentilePath>,
    #[serde(skip_serializing_if = "Option::is_none")]
    deterministic: Option<DeterministicResults>,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

fn build_simulate_response(
    params: &SimulationParams,
    results: SimulationResults,
    deterministic: Option<DeterministicResults>,
) -> SimulateResponse {
    let avg_guardrail_hits = if results.guardrail_hits.is_empty() {
        0.0
    } else {
        results.guardrail_hits.iter().map(|&hits| hits as f64).sum::<f64>()
            / results.guardrail_hits.len() as f64
    };
    let depleted_trials = results
        .years_depleted
        .iter()
        .filter(|&&year| year != -1)
        .count();
    SimulateResponse {
        trials: params.num_trials,
        horizon_years: params.horizon_years,
        start_year: params.start_year,
        success_rate: results.success_rate,
        depleted_trials,
        avg_guardrail_hits,
        solver_failures: results.solver_failures,
        summary: results.summary,
        wealth_bands: results.wealth_bands,
        percentile_paths: results.percentile_paths,
        deterministic,
    }
}

pub async fn run_http_server(port: u16) -> std::io::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let app = Router::new()
        .route(
            "/api/simulate",
            get(simulate_get_handler).post(simulate_post_handler),
        )
        .fallback(not_found_handler);

    let listener = TcpListener::bind(addr).await?;
    println!("retirement simulation API listening on http://{addr}");
    println!("POST parameters to http://127.0.0.1:{port}/api/simulate");

    axum::serve(listener, app).await
}

async fn not_found_handler() -> Response {
    error_response(StatusCode::NOT_FOUND, "Not found")
}

async fn simulate_get_handler(Query(payload): Query<SimulatePayload>) -> Response {
    simulate_handler_impl(payload).await
}

async fn simulate_post_handler(Json(payload): Json<SimulatePayload>) -> Response {
    simulate_handler_impl(payload).await
}

async fn simulate_handler_impl(payload: SimulatePayload) -> Response {
    let request = match simulate_request_from_payload(payload) {
        Ok(request) => request,
        Err(msg) => return error_response(StatusCode::BAD_REQUEST, &msg),
    };

    let simulator = match RetirementSimulator::new(request.params) {
        Ok(simulator) => simulator,
        Err(err) => return error_response(StatusCode::BAD_REQUEST, &err.to_string()),
    };
    let results = simulator.run();
    let deterministic = if request.deterministic {
        match DeterministicProjector::new(simulator.params().clone()) {
            Ok(projector) => Some(projector.run()),
            Err(err) => return error_response(StatusCode::BAD_REQUEST, &err.to_string()),
        }
    } else {
        None
    };

    let response = build_simulate_response(simulator.params(), results, deterministic);
    json_response(StatusCode::OK, response)
}

fn json_response<T: Serialize>(status: StatusCode, body: T) -> Response {
    let mut response = (status, Json(body)).into_response();
    response.headers_mut().insert(
        header::CACHE_CONTROL,
        "no-store".parse().expect("valid header"),
    );
    response
}

fn error_response(status: StatusCode, msg: &str) -> Response {
    json_response(
        status,
        ErrorResponse {
            error: msg.to_string(),
        },
    )
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum OutputFormat {
    Summary,
    Json,
}

#[derive(Parser, Debug)]
#[command(
    name = "retiresim-run",
    about = "Run one retirement Monte Carlo simulation from JSON parameters"
)]
struct RunArgs {
    #[arg(
        long,
        help = "JSON parameter file using the API payload schema; built-in defaults when omitted"
    )]
    params: Option<PathBuf>,
    #[arg(long, help = "Override the trial count")]
    trials: Option<usize>,
    #[arg(long, help = "Override the random seed")]
    seed: Option<u64>,
    #[arg(long, help = "Also run the expected-return projection")]
    deterministic: bool,
    #[arg(long, value_enum, default_value_t = OutputFormat::Summary)]
    output: OutputFormat,
}

pub fn run_cli(args: &[String]) -> anyhow::Result<()> {
    let args = RunArgs::try_parse_from(
        std::iter::once("retiresim-run".to_string()).chain(args.iter().cloned()),
    )?;

    let payload = match &args.params {
        Some(path) => {
            let text = fs::read_to_string(path)
                .with_context(|| format!("reading parameters from {}", path.display()))?;
            serde_json::from_str::<SimulatePayload>(&text)
                .with_context(|| format!("parsing parameters from {}", path.display()))?
        }
        None => SimulatePayload::default(),
    };

    let mut request = simulate_request_from_payload(payload).map_err(anyhow::Error::msg)?;
    if let Some(trials) = args.trials {
        request.params.num_trials = trials;
    }
    if let Some(seed) = args.seed {
        request.params.random_seed = Some(seed);
    }
    let run_deterministic = request.deterministic || args.deterministic;

    let simulator = RetirementSimulator::new(request.params)?;
    let results = simulator.run();
    let deterministic = if run_deterministic {
        Some(DeterministicProjector::new(simulator.params().clone())?.run())
    } else {
        None
    };
    let response = build_simulate_response(simulator.params(), results, deterministic);

    match args.output {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&response)?),
        OutputFormat::Summary => print_summary(&response),
    }
    Ok(())
}

fn print_summary(response: &SimulateResponse) {
    println!(
        "Success rate: {:.1}% over {} trials x {} years",
        response.success_rate * 100.0,
        response.trials,
        response.horizon_years
    );
    println!(
        "Terminal wealth: mean ${:.0}, p10 ${:.0}, median ${:.0}, p90 ${:.0}",
        response.summary.mean, response.summary.p10, response.summary.p50, response.summary.p90
    );
    println!("Depleted trials: {}", response.depleted_trials);
    println!(
        "Guardrail hits per trial: {:.2}",
        response.avg_guardrail_hits
    );
    if response.solver_failures > 0 {
        println!("Solver failures: {}", response.solver_failures);
    }
    if let Some(deterministic) = &response.deterministic {
        if let Some(terminal) = deterministic.wealth_path.last() {
            println!("Deterministic terminal wealth: ${terminal:.0}");
        }
    }
}

#[cfg(test)]
fn simulate_request_from_json(json: &str) -> Result<SimulateRequest, String> {
    let payload = serde_json::from_str::<SimulatePayload>(json)
        .map_err(|e| format!("Invalid API JSON payload: {e}"))?;
    simulate_request_from_payload(payload)
}
