use crate::loan::{CalculationResult, RepaymentMonthRecord};
use chrono::{Months, NaiveDate};
use std::{fmt, io};

/// Display currency. Only changes the symbol in front of monetary values.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum Currency {
    #[default]
    Inr,
    Usd,
    Eur,
    Gbp,
}

impl Currency {
    pub fn symbol(&self) -> &'static str {
        match self {
            Currency::Inr => "₹",
            Currency::Usd => "$",
            Currency::Eur => "€",
            Currency::Gbp => "£",
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Currency::Inr => "INR",
            Currency::Usd => "USD",
            Currency::Eur => "EUR",
            Currency::Gbp => "GBP",
        }
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.code(), self.symbol())
    }
}

pub fn format_money(currency: Currency, amount: f64) -> String {
    format!("{} {:.2}", currency.symbol(), amount)
}

/// Six headline figures as (label, formatted value) pairs.
pub fn summary_metrics(
    result: &CalculationResult,
    currency: Currency,
) -> Vec<(&'static str, String)> {
    vec![
        ("Monthly EMI", format_money(currency, result.emi)),
        ("Total Repayment", format_money(currency, result.total_repayment)),
        ("Total Interest Paid", format_money(currency, result.total_interest)),
        ("Years to Repay Loan", format!("{:.2} years", result.years_to_repay)),
        ("Annual Savings", format_money(currency, result.annual_savings)),
        (
            "% Salary to Loan Payment",
            format!("{:.2}%", result.percent_allocated_to_loan),
        ),
    ]
}

/// Calendar labels for schedule months. Month 1 falls one month after the
/// grace period ends.
#[derive(Clone, Copy, PartialEq, Debug)]
pub struct DueDates {
    start: NaiveDate,
    grace_period_months: u32,
}

impl DueDates {
    pub fn new(start: NaiveDate, grace_period_months: u32) -> Self {
        Self {
            start,
            grace_period_months,
        }
    }

    pub fn for_month(&self, month: u32) -> Option<NaiveDate> {
        self.grace_period_months
            .checked_add(month)
            .and_then(|m| self.start.checked_add_months(Months::new(m)))
    }
}

const SCHEDULE_HEADERS: [&str; 5] = [
    "Month",
    "Monthly Payment",
    "Interest Paid",
    "Principal Paid",
    "Remaining Balance",
];

/// Writes the headline figures and the schedule as aligned text. `rows`
/// limits how many schedule months are printed.
pub fn write_table<W: io::Write>(
    out: &mut W,
    result: &CalculationResult,
    currency: Currency,
    due_dates: Option<&DueDates>,
    rows: Option<usize>,
) -> io::Result<()> {
    writeln!(out, "Loan Repayment Summary")?;
    writeln!(out, "Currency: {}", currency)?;
    writeln!(out, "{}", "-".repeat(48))?;
    for (label, value) in summary_metrics(result, currency) {
        writeln!(out, "{:<26}{:>22}", label, value)?;
    }
    writeln!(out)?;

    writeln!(out, "Detailed Repayment Schedule")?;
    if due_dates.is_some() {
        write!(out, "{:>10} ", "Due Date")?;
    }
    writeln!(
        out,
        "{:>5} {:>18} {:>18} {:>18} {:>18}",
        SCHEDULE_HEADERS[0],
        SCHEDULE_HEADERS[1],
        SCHEDULE_HEADERS[2],
        SCHEDULE_HEADERS[3],
        SCHEDULE_HEADERS[4]
    )?;
    let width = if due_dates.is_some() { 93 } else { 82 };
    writeln!(out, "{}", "-".repeat(width))?;

    let shown = rows.unwrap_or(result.schedule.len());
    for rec in result.schedule.iter().take(shown) {
        if let Some(dates) = due_dates {
            write!(out, "{:>10} ", date_label(dates, rec))?;
        }
        writeln!(
            out,
            "{:>5} {:>18.2} {:>18.2} {:>18.2} {:>18.2}",
            rec.month,
            rec.monthly_payment,
            rec.interest_paid,
            rec.principal_paid,
            rec.remaining_balance
        )?;
    }
    if result.schedule.len() > shown {
        writeln!(out, "... ({} more months)", result.schedule.len() - shown)?;
    }
    Ok(())
}

/// Writes the schedule as CSV with two-decimal values.
pub fn write_csv<W: io::Write>(
    out: &mut W,
    result: &CalculationResult,
    due_dates: Option<&DueDates>,
) -> io::Result<()> {
    if due_dates.is_some() {
        write!(out, "Due Date,")?;
    }
    writeln!(out, "{}", SCHEDULE_HEADERS.join(","))?;

    for rec in &result.schedule {
        if let Some(dates) = due_dates {
            write!(out, "{},", date_label(dates, rec))?;
        }
        writeln!(
            out,
            "{},{:.2},{:.2},{:.2},{:.2}",
            rec.month,
            rec.monthly_payment,
            rec.interest_paid,
            rec.principal_paid,
            rec.remaining_balance
        )?;
    }
    Ok(())
}

fn date_label(dates: &DueDates, rec: &RepaymentMonthRecord) -> String {
    dates
        .for_month(rec.month)
        .map(|d| d.to_string())
        .unwrap_or_default()
}
