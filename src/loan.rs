use crate::error::CalcError;
use log::{info, trace, warn};
use std::fmt;

/// Fixed yearly living-cost deduction taken off the salary when estimating
/// annual savings. It is a flat figure in whatever currency the inputs use.
pub const LIVING_COST_DEDUCTION: f64 = 35000.;

/// Hard ceiling on simulated months before the run is aborted.
pub const MAX_SIMULATION_MONTHS: u32 = 6000;

const MONTHS_PER_YEAR: u32 = 12;

/// Inputs for one calculation run.
#[derive(Clone, Copy, PartialEq, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct LoanParameters {
    pub tuition_fees: f64,
    pub annual_interest_rate_percent: f64,
    pub annual_salary: f64,
    pub grace_period_months: u32,
    pub loan_term_years: u32,
    pub salary_growth_rate_percent: f64,
    pub extra_annual_payment: f64,
    pub allocation_fraction: f64,
}

impl Default for LoanParameters {
    fn default() -> Self {
        Self {
            tuition_fees: 7_500_000.,
            annual_interest_rate_percent: 10.,
            annual_salary: 6_000_000.,
            grace_period_months: 12,
            loan_term_years: 10,
            salary_growth_rate_percent: 5.,
            extra_annual_payment: 50_000.,
            allocation_fraction: 0.30,
        }
    }
}

impl LoanParameters {
    pub fn monthly_rate(&self) -> f64 {
        monthly_rate(self.annual_interest_rate_percent)
    }

    /// Rejects inputs the calculation is not defined for.
    pub fn validate(&self) -> Result<(), CalcError> {
        positive("tuition_fees", self.tuition_fees)?;
        positive("annual_salary", self.annual_salary)?;
        non_negative(
            "annual_interest_rate_percent",
            self.annual_interest_rate_percent,
        )?;
        non_negative("salary_growth_rate_percent", self.salary_growth_rate_percent)?;
        non_negative("extra_annual_payment", self.extra_annual_payment)?;

        if self.loan_term_years < 1 {
            return Err(CalcError::invalid(
                "loan_term_years",
                "must be at least 1 year",
            ));
        }
        if self.loan_term_years > MAX_SIMULATION_MONTHS / MONTHS_PER_YEAR {
            return Err(CalcError::invalid(
                "loan_term_years",
                "must not exceed 500 years",
            ));
        }
        if !(0. ..=1.).contains(&self.allocation_fraction) {
            return Err(CalcError::invalid(
                "allocation_fraction",
                "must be between 0 and 1",
            ));
        }
        Ok(())
    }
}

fn positive(field: &str, value: f64) -> Result<(), CalcError> {
    if value.is_finite() && value > 0. {
        Ok(())
    } else {
        Err(CalcError::invalid(field, "must be a positive number"))
    }
}

fn non_negative(field: &str, value: f64) -> Result<(), CalcError> {
    if value.is_finite() && value >= 0. {
        Ok(())
    } else {
        Err(CalcError::invalid(field, "must not be negative"))
    }
}

fn monthly_rate(annual_rate_percent: f64) -> f64 {
    annual_rate_percent / 100. / 12.
}

/// Closed-form installment figures for the nominal loan term.
#[derive(Clone, Copy, PartialEq, Debug)]
pub struct EmiBreakdown {
    pub emi: f64,
    pub total_repayment: f64,
    /// Measured against the original principal, not the grace-adjusted one.
    pub total_interest: f64,
    pub adjusted_principal: f64,
}

/// Grace-period interest accrues simply (no compounding) and is added to the
/// principal once.
pub fn capitalize_grace_interest(principal: f64, monthly_rate: f64, grace_period: u32) -> f64 {
    if grace_period > 0 {
        principal * (1. + monthly_rate * grace_period as f64)
    } else {
        principal
    }
}

pub fn compute_emi(
    &principal: &f64,    // tuition fees before grace accrual
    &annual_rate: &f64,  // annual interest rate in percent (i.e., 10.0)
    &grace_period: &u32, // months of interest-only accrual
    &term: &u32,         // loan term in years
) -> Result<EmiBreakdown, CalcError> {
    if term < 1 {
        return Err(CalcError::invalid(
            "loan_term_years",
            "must be at least 1 year",
        ));
    }
    let pmt_count = term
        .checked_mul(MONTHS_PER_YEAR)
        .ok_or_else(|| CalcError::invalid("loan_term_years", "too many payments"))?;
    let total_pmts = pmt_count as f64;

    let rate = monthly_rate(annual_rate);
    let adjusted_principal = capitalize_grace_interest(principal, rate, grace_period);

    let emi = if rate == 0. {
        adjusted_principal / total_pmts
    } else {
        let factor = (1. + rate).powf(total_pmts);
        (adjusted_principal * rate * factor) / (factor - 1.)
    };

    if !emi.is_finite() {
        return Err(CalcError::NumericOverflow {
            context: format!("emi over {} payments", pmt_count),
        });
    }

    let total_repayment = emi * total_pmts;
    Ok(EmiBreakdown {
        emi,
        total_repayment,
        total_interest: total_repayment - principal,
        adjusted_principal,
    })
}

#[derive(Clone, Copy, PartialEq, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct RepaymentMonthRecord {
    pub month: u32,
    pub monthly_payment: f64,
    pub interest_paid: f64,
    pub principal_paid: f64,
    pub remaining_balance: f64,
}

impl RepaymentMonthRecord {
    pub fn new(
        month: u32,
        monthly_payment: f64,
        interest_paid: f64,
        principal_paid: f64,
        remaining_balance: f64,
    ) -> Self {
        Self {
            month,
            monthly_payment,
            interest_paid,
            principal_paid,
            remaining_balance,
        }
    }
}

impl fmt::Display for RepaymentMonthRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "month {}, payment {:.2}, interest paid {:.2}, principal paid {:.2}, remaining balance {:.2}",
            self.month,
            self.monthly_payment,
            self.interest_paid,
            self.principal_paid,
            self.remaining_balance
        )
    }
}

/// Month-by-month repayment driven by a share of a growing salary.
///
/// Yields one record per month until the balance is cleared. An error is
/// yielded at most once and ends the sequence.
#[derive(Clone, Debug)]
pub struct RepaymentSimulator {
    balance: f64,
    monthly_rate: f64,
    annual_salary: f64,
    monthly_income: f64,
    allocation_fraction: f64,
    extra_annual_payment: f64,
    salary_growth_rate_percent: f64,
    month: u32,
    max_months: u32,
    finished: bool,
}

pub fn simulate(
    adjusted_principal: f64,
    monthly_rate: f64,
    starting_annual_salary: f64,
    allocation_fraction: f64,
    extra_annual_payment: f64,
    salary_growth_rate_percent: f64,
) -> RepaymentSimulator {
    RepaymentSimulator {
        balance: adjusted_principal,
        monthly_rate,
        annual_salary: starting_annual_salary,
        monthly_income: starting_annual_salary / 12.,
        allocation_fraction,
        extra_annual_payment,
        salary_growth_rate_percent,
        month: 0,
        max_months: MAX_SIMULATION_MONTHS,
        finished: false,
    }
}

impl RepaymentSimulator {
    pub fn with_max_months(mut self, max_months: u32) -> Self {
        self.max_months = max_months;
        self
    }

    /// Salary after every raise applied so far.
    pub fn annual_salary(&self) -> f64 {
        self.annual_salary
    }

    pub fn balance(&self) -> f64 {
        self.balance
    }

    fn fail(&mut self, err: CalcError) -> Option<Result<RepaymentMonthRecord, CalcError>> {
        warn!("repayment simulation aborted: {}", err);
        self.finished = true;
        Some(Err(err))
    }
}

impl Iterator for RepaymentSimulator {
    type Item = Result<RepaymentMonthRecord, CalcError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished || self.balance <= 0. {
            return None;
        }
        if self.month >= self.max_months {
            return self.fail(CalcError::RunawayComputation { months: self.month });
        }

        self.month += 1;
        let year_end = self.month % MONTHS_PER_YEAR == 0;

        let mut allocation = self.monthly_income * self.allocation_fraction;
        if year_end {
            allocation += self.extra_annual_payment;
        }

        let interest = self.balance * self.monthly_rate;
        let principal_payment = allocation - interest;
        if principal_payment <= 0. {
            return self.fail(CalcError::InsufficientPayment {
                month: self.month,
                allocation,
                interest,
            });
        }

        self.balance -= principal_payment;
        let record = RepaymentMonthRecord::new(
            self.month,
            allocation,
            interest,
            principal_payment,
            self.balance.max(0.),
        );
        trace!("{}", record);

        // the raise applies from the following month
        if year_end {
            self.annual_salary += self.annual_salary * (self.salary_growth_rate_percent / 100.);
            self.monthly_income = self.annual_salary / 12.;
        }

        if self.balance <= 0. {
            self.finished = true;
        }
        Some(Ok(record))
    }
}

/// Savings left after the living-cost deduction and a year of installments.
pub fn annual_savings(annual_salary: f64, emi: f64) -> f64 {
    annual_salary - LIVING_COST_DEDUCTION - 12. * emi
}

pub fn percent_allocated_to_loan(annual_salary: f64, emi: f64) -> f64 {
    (12. * emi / annual_salary) * 100.
}

/// Summary metrics plus the full simulated schedule.
///
/// The installment figures come from the fixed-term formula while the
/// schedule comes from the salary-driven simulation. The two are not
/// reconciled, and the savings metrics use the starting salary.
#[derive(Clone, PartialEq, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct CalculationResult {
    pub adjusted_principal: f64,
    pub monthly_rate: f64,
    pub emi: f64,
    pub total_repayment: f64,
    pub total_interest: f64,
    pub years_to_repay: f64,
    pub annual_savings: f64,
    pub percent_allocated_to_loan: f64,
    pub final_annual_salary: f64,
    pub schedule: Vec<RepaymentMonthRecord>,
}

impl CalculationResult {
    pub fn months_to_repay(&self) -> usize {
        self.schedule.len()
    }

    pub fn balance_series(&self) -> Vec<(u32, f64)> {
        self.schedule
            .iter()
            .map(|r| (r.month, r.remaining_balance))
            .collect()
    }

    /// (month, principal paid, interest paid)
    pub fn payment_breakdown_series(&self) -> Vec<(u32, f64, f64)> {
        self.schedule
            .iter()
            .map(|r| (r.month, r.principal_paid, r.interest_paid))
            .collect()
    }
}

/// Runs both phases for one set of inputs. No partial schedule is returned
/// on failure.
pub fn calculate(params: &LoanParameters) -> Result<CalculationResult, CalcError> {
    params.validate()?;
    info!("calculating repayment plan for {:?}", params);

    let quote = compute_emi(
        &params.tuition_fees,
        &params.annual_interest_rate_percent,
        &params.grace_period_months,
        &params.loan_term_years,
    )?;
    let rate = params.monthly_rate();

    let mut simulator = simulate(
        quote.adjusted_principal,
        rate,
        params.annual_salary,
        params.allocation_fraction,
        params.extra_annual_payment,
        params.salary_growth_rate_percent,
    );
    let schedule = simulator
        .by_ref()
        .collect::<Result<Vec<RepaymentMonthRecord>, CalcError>>()?;

    let result = CalculationResult {
        adjusted_principal: quote.adjusted_principal,
        monthly_rate: rate,
        emi: quote.emi,
        total_repayment: quote.total_repayment,
        total_interest: quote.total_interest,
        years_to_repay: schedule.len() as f64 / MONTHS_PER_YEAR as f64,
        annual_savings: annual_savings(params.annual_salary, quote.emi),
        percent_allocated_to_loan: percent_allocated_to_loan(params.annual_salary, quote.emi),
        final_annual_salary: simulator.annual_salary(),
        schedule,
    };
    info!(
        "emi {:.2}, repaid in {} months",
        result.emi,
        result.months_to_repay()
    );
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::{
        calculate, capitalize_grace_interest, compute_emi, simulate, LoanParameters,
        LIVING_COST_DEDUCTION, MAX_SIMULATION_MONTHS,
    };
    use crate::error::CalcError;
    use approx::{assert_abs_diff_eq, assert_relative_eq};
    use test_log::test;

    #[test]
    fn test_grace_period_capitalization() {
        assert_eq!(capitalize_grace_interest(7_500_000., 0.01, 0), 7_500_000.);

        let quote = compute_emi(&7_500_000., &10., &0, &10).unwrap();
        assert_eq!(quote.adjusted_principal, 7_500_000.);

        let rate = 10. / 100. / 12.;
        let quote = compute_emi(&7_500_000., &10., &12, &10).unwrap();
        assert_relative_eq!(quote.adjusted_principal, 7_500_000. * (1. + rate * 12.));
        assert_relative_eq!(quote.adjusted_principal, 8_250_000., epsilon = 1e-6);
    }

    #[test]
    fn test_emi_standard_formula() {
        let quote = compute_emi(&1_200_000., &12., &0, &1).unwrap();
        assert_abs_diff_eq!(quote.emi, 106_618.55, epsilon = 0.01);
        assert_abs_diff_eq!(quote.total_repayment, 1_279_422.56, epsilon = 0.01);
        assert_abs_diff_eq!(quote.total_interest, 79_422.56, epsilon = 0.01);
    }

    #[test]
    fn test_emi_discounts_back_to_principal() {
        for (rate_pct, grace, term) in [(10., 12, 10), (7.5, 0, 15), (3.2, 6, 4)] {
            let quote = compute_emi(&2_000_000., &rate_pct, &grace, &term).unwrap();
            let r = rate_pct / 100. / 12.;
            let factor = (1. + r).powf((term * 12) as f64);
            let pv = quote.emi * (factor - 1.) / (r * factor);
            assert_relative_eq!(pv, quote.adjusted_principal, max_relative = 1e-9);
        }
    }

    #[test]
    fn test_emi_zero_rate() {
        let quote = compute_emi(&600_000., &0., &0, &5).unwrap();
        assert_eq!(quote.emi, 10_000.);
        assert_eq!(quote.total_repayment, 600_000.);
        assert_eq!(quote.total_interest, 0.);

        // grace period accrues nothing at a zero rate
        let quote = compute_emi(&600_000., &0., &24, &5).unwrap();
        assert_eq!(quote.adjusted_principal, 600_000.);
        assert!(quote.emi.is_finite());
    }

    #[test]
    fn test_total_interest_uses_original_principal() {
        let quote = compute_emi(&1_000_000., &12., &10, &5).unwrap();
        assert_relative_eq!(quote.adjusted_principal, 1_100_000., epsilon = 1e-6);
        assert_relative_eq!(
            quote.total_interest,
            quote.total_repayment - 1_000_000.,
            epsilon = 1e-6
        );
    }

    #[test]
    fn test_emi_rejects_zero_term() {
        assert!(matches!(
            compute_emi(&1_000_000., &12., &0, &0),
            Err(CalcError::InvalidInput { .. })
        ));
    }

    #[test]
    fn test_emi_huge_term() {
        // payment count does not fit in u32
        assert!(matches!(
            compute_emi(&1_000_000., &10., &0, &400_000_000),
            Err(CalcError::InvalidInput { .. })
        ));
        // growth factor overflows to infinity
        assert!(matches!(
            compute_emi(&1_000_000., &10., &0, &100_000),
            Err(CalcError::NumericOverflow { .. })
        ));
        assert!(matches!(
            compute_emi(&1_000_000., &5_000., &0, &500),
            Err(CalcError::NumericOverflow { .. })
        ));
    }

    #[test]
    fn test_simulation_balance_invariant() {
        let records: Vec<_> = simulate(8_250_000., 10. / 100. / 12., 6_000_000., 0.3, 50_000., 5.)
            .collect::<Result<_, _>>()
            .unwrap();

        let mut prev = 8_250_000.;
        for (i, rec) in records.iter().enumerate() {
            assert_eq!(rec.month as usize, i + 1);
            assert_relative_eq!(rec.interest_paid, prev * 10. / 100. / 12., epsilon = 1e-6);
            assert_relative_eq!(
                rec.principal_paid,
                rec.monthly_payment - rec.interest_paid,
                epsilon = 1e-6
            );
            assert_abs_diff_eq!(
                rec.remaining_balance,
                (prev - rec.principal_paid).max(0.),
                epsilon = 1e-6
            );
            assert!(rec.remaining_balance <= prev);
            prev = rec.remaining_balance;
        }
        assert_eq!(records.len(), 63);
        assert_eq!(records.last().unwrap().remaining_balance, 0.);
        assert!(records[..62].iter().all(|r| r.remaining_balance > 0.));
    }

    #[test]
    fn test_extra_payment_before_raise() {
        // zero rate so every payment goes to principal
        let records: Vec<_> = simulate(10_000_000., 0., 120_000., 0.5, 1_000., 10.)
            .take(13)
            .collect::<Result<_, _>>()
            .unwrap();

        assert_relative_eq!(records[0].monthly_payment, 5_000., epsilon = 1e-9);
        assert_relative_eq!(records[10].monthly_payment, 5_000., epsilon = 1e-9);
        assert_relative_eq!(records[11].monthly_payment, 6_000., epsilon = 1e-9);
        assert_relative_eq!(records[12].monthly_payment, 5_500., epsilon = 1e-9);
    }

    #[test]
    fn test_simulation_insufficient_payment() {
        let mut sim = simulate(1_000_000., 0.01, 600_000., 0., 0., 5.);
        match sim.next() {
            Some(Err(CalcError::InsufficientPayment { month, .. })) => assert_eq!(month, 1),
            other => panic!("expected insufficient payment, got {:?}", other),
        }
        assert!(sim.next().is_none());

        // interest exactly matched is still insufficient
        let mut sim = simulate(1_000., 0.5, 6_000., 1., 0., 0.);
        assert!(matches!(
            sim.next(),
            Some(Err(CalcError::InsufficientPayment { month: 1, .. }))
        ));
    }

    #[test]
    fn test_simulation_runaway() {
        // one unit per month against a million
        let result: Result<Vec<_>, _> = simulate(1_000_000., 0., 12., 1., 0., 0.).collect();
        assert_eq!(
            result,
            Err(CalcError::RunawayComputation {
                months: MAX_SIMULATION_MONTHS
            })
        );

        let result: Result<Vec<_>, _> = simulate(1_000_000., 0., 12., 1., 0., 0.)
            .with_max_months(24)
            .collect();
        assert_eq!(result, Err(CalcError::RunawayComputation { months: 24 }));
    }

    #[test]
    fn test_simulation_exact_payoff() {
        let mut sim = simulate(1_200., 0., 1_200., 1., 0., 0.);
        assert_eq!(sim.balance(), 1_200.);

        let records: Vec<_> = sim.by_ref().collect::<Result<_, _>>().unwrap();
        assert_eq!(records.len(), 12);
        assert_eq!(records[11].remaining_balance, 0.);
        assert_eq!(sim.balance(), 0.);
        assert!(sim.next().is_none());
    }

    #[test]
    fn test_calculate_defaults() {
        let params = LoanParameters::default();
        let result = calculate(&params).unwrap();

        assert_relative_eq!(result.adjusted_principal, 8_250_000., epsilon = 1e-6);
        assert_abs_diff_eq!(result.emi, 109_024.36, epsilon = 0.01);
        assert_abs_diff_eq!(result.total_repayment, 13_082_922.95, epsilon = 0.01);
        assert_abs_diff_eq!(result.total_interest, 5_582_922.95, epsilon = 0.01);
        assert_eq!(result.months_to_repay(), 63);
        assert_relative_eq!(result.years_to_repay, 5.25);
        assert_relative_eq!(
            result.annual_savings,
            6_000_000. - LIVING_COST_DEDUCTION - 12. * result.emi,
            epsilon = 1e-6
        );
        assert_abs_diff_eq!(result.percent_allocated_to_loan, 21.80, epsilon = 0.01);
        assert_abs_diff_eq!(result.final_annual_salary, 7_657_689.375, epsilon = 1e-6);

        let first = result.schedule[0];
        assert_relative_eq!(first.monthly_payment, 150_000., epsilon = 1e-6);
        assert_relative_eq!(first.interest_paid, 68_750., epsilon = 1e-6);
        assert_relative_eq!(first.remaining_balance, 8_168_750., epsilon = 1e-6);
    }

    #[test]
    fn test_calculate_series() {
        let result = calculate(&LoanParameters::default()).unwrap();

        let balances = result.balance_series();
        assert_eq!(balances.len(), result.months_to_repay());
        assert_eq!(balances[0].0, 1);
        assert_eq!(balances.last().unwrap().1, 0.);

        let breakdown = result.payment_breakdown_series();
        assert_eq!(breakdown[11].0, 12);
        assert_relative_eq!(
            breakdown[11].1 + breakdown[11].2,
            result.schedule[11].monthly_payment,
            epsilon = 1e-6
        );
    }

    #[test]
    fn test_calculate_insufficient_allocation() {
        let params = LoanParameters {
            allocation_fraction: 0.,
            extra_annual_payment: 0.,
            ..LoanParameters::default()
        };
        assert!(matches!(
            calculate(&params),
            Err(CalcError::InsufficientPayment { month: 1, .. })
        ));
    }

    #[test]
    fn test_calculate_validation() {
        let bad = [
            LoanParameters {
                loan_term_years: 0,
                ..LoanParameters::default()
            },
            LoanParameters {
                allocation_fraction: 1.5,
                ..LoanParameters::default()
            },
            LoanParameters {
                tuition_fees: 0.,
                ..LoanParameters::default()
            },
            LoanParameters {
                annual_salary: f64::NAN,
                ..LoanParameters::default()
            },
            LoanParameters {
                annual_interest_rate_percent: -1.,
                ..LoanParameters::default()
            },
            LoanParameters {
                loan_term_years: 501,
                ..LoanParameters::default()
            },
            LoanParameters {
                loan_term_years: 400_000_000,
                ..LoanParameters::default()
            },
        ];
        for params in bad {
            assert!(matches!(
                calculate(&params),
                Err(CalcError::InvalidInput { .. })
            ));
        }
        assert!(LoanParameters::default().validate().is_ok());
        let longest = LoanParameters {
            loan_term_years: 500,
            ..LoanParameters::default()
        };
        assert!(longest.validate().is_ok());
    }
}
