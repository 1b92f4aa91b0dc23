use super::types::FilingStatus;

const SOLVER_TOLERANCE: f64 = 1e-6;
const SOLVER_MAX_ITERATIONS: usize = 100;
const BRACKET_EXPANSIONS: usize = 20;

pub const DEFAULT_STANDARD_DEDUCTION: f64 = 29_200.0;

/// 2024 federal brackets as `(floor, marginal rate)` pairs.
pub fn default_tax_brackets(status: FilingStatus) -> Vec<(f64, f64)> {
    match status {
        FilingStatus::MarriedJoint => vec![(0.0, 0.10), (94_300.0, 0.22), (201_000.0, 0.24)],
        FilingStatus::Single => vec![(0.0, 0.10), (47_150.0, 0.22), (100_500.0, 0.24)],
    }
}

/// Progressive tax on `taxable_income`. Each bracket taxes the band between
/// its floor and the next floor; the top bracket is unbounded.
pub fn calculate_tax(taxable_income: f64, brackets: &[(f64, f64)]) -> f64 {
    if taxable_income <= 0.0 || brackets.is_empty() {
        return 0.0;
    }
    let mut sorted = brackets.to_vec();
    sorted.sort_by(|a, b| a.0.total_cmp(&b.0));
    let mut tax = 0.0;
    for (i, &(floor, rate)) in sorted.iter().enumerate() {
        let next_floor = sorted.get(i + 1).map_or(f64::INFINITY, |b| b.0);
        let band = (taxable_income.min(next_floor) - floor).max(0.0);
        tax += band * rate;
    }
    tax
}

/// Rate on the next dollar of gross income after the standard deduction.
pub fn marginal_tax_rate(
    gross_income: f64,
    standard_deduction: f64,
    brackets: &[(f64, f64)],
) -> f64 {
    let taxable_income = (gross_income - standard_deduction).max(0.0);
    if taxable_income <= 0.0 || brackets.is_empty() {
        return 0.0;
    }
    let mut sorted = brackets.to_vec();
    sorted.sort_by(|a, b| a.0.total_cmp(&b.0));
    let mut rate = 0.0;
    for &(floor, bracket_rate) in &sorted {
        if taxable_income >= floor {
            rate = bracket_rate;
        }
    }
    rate
}

pub fn effective_tax_rate(
    gross_income: f64,
    standard_deduction: f64,
    brackets: &[(f64, f64)],
) -> f64 {
    if gross_income <= 0.0 {
        return 0.0;
    }
    let taxable_income = (gross_income - standard_deduction).max(0.0);
    calculate_tax(taxable_income, brackets) / gross_income
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct GrossSolve {
    pub gross: f64,
    pub tax: f64,
    /// False when the bracketing or bisection budget ran out; the returned
    /// gross is then the best available estimate.
    pub converged: bool,
}

/// Finds the gross withdrawal W such that W - tax(W) covers `net_need`,
/// where tax is assessed on `max(0, W + other_taxable_income -
/// standard_deduction)`. Bisection: bracket the root, then halve.
pub fn solve_gross_withdrawal_detailed(
    net_need: f64,
    other_taxable_income: f64,
    standard_deduction: f64,
    brackets: &[(f64, f64)],
) -> GrossSolve {
    if net_need <= 0.0 {
        return GrossSolve {
            gross: 0.0,
            tax: 0.0,
            converged: true,
        };
    }

    let tax_for = |gross: f64| {
        calculate_tax(
            (gross + other_taxable_income - standard_deduction).max(0.0),
            brackets,
        )
    };
    let residual = |gross: f64| gross - tax_for(gross) - net_need;

    // Lower bound assumes zero tax; if it already nets the target the
    // bounds cannot bracket the root.
    let mut w_low = net_need;
    if residual(w_low) > 0.0 {
        return GrossSolve {
            gross: w_low,
            tax: tax_for(w_low),
            converged: true,
        };
    }

    let top_rate = brackets
        .iter()
        .max_by(|a, b| a.0.total_cmp(&b.0))
        .map_or(0.5, |b| b.1);
    let denominator = 1.0 - top_rate * 1.2;
    let mut w_high = if denominator > 0.0 {
        net_need / denominator
    } else {
        net_need * 2.0
    };
    let mut expansions = 0;
    while residual(w_high) < 0.0 && expansions < BRACKET_EXPANSIONS {
        w_high *= 2.0;
        expansions += 1;
    }
    if residual(w_high) < 0.0 {
        return GrossSolve {
            gross: w_high,
            tax: tax_for(w_high),
            converged: false,
        };
    }

    for _ in 0..SOLVER_MAX_ITERATIONS {
        let mid = 0.5 * (w_low + w_high);
        let r = residual(mid);
        if r.abs() < SOLVER_TOLERANCE {
            return GrossSolve {
                gross: mid,
                tax: tax_for(mid),
                converged: true,
            };
        }
        if r < 0.0 {
            w_low = mid;
        } else {
            w_high = mid;
        }
    }
    let best = 0.5 * (w_low + w_high);
    GrossSolve {
        gross: best,
        tax: tax_for(best),
        converged: false,
    }
}

pub fn solve_gross_withdrawal(
    net_need: f64,
    other_taxable_income: f64,
    standard_deduction: f64,
    brackets: &[(f64, f64)],
) -> (f64, f64) {
    let solve =
        solve_gross_withdrawal_detailed(net_need, other_taxable_income, standard_deduction, brackets);
    (solve.gross, solve.tax)
}

/// Gross-up with no other taxable income, under explicit brackets or the
/// filing status defaults.
pub fn gross_up_withdrawal(
    net_need: f64,
    filing_status: FilingStatus,
    standard_deduction: f64,
    custom_brackets: Option<&[(f64, f64)]>,
) -> (f64, f64) {
    match custom_brackets {
        Some(brackets) => solve_gross_withdrawal(net_need, 0.0, standard_deduction, brackets),
        None => solve_gross_withdrawal(
            net_need,
            0.0,
            standard_deduction,
            &default_tax_brackets(filing_status),
        ),
    }
}
