use chrono::NaiveDate;
use clap::{ArgAction, Parser, ValueEnum};
use loan_planner::loan::{calculate, CalculationResult, LoanParameters};
use loan_planner::report::{self, Currency, DueDates};
use log::info;
use simple_logger::SimpleLogger;
use std::error::Error;
use std::io::{self, Write};
use std::process;

/// Loan repayment and financial planner for study loans
#[derive(Parser, Debug)]
#[command(name = "loan_planner", version, about)]
struct Cli {
    /// Total tuition fees (loan principal)
    #[arg(long, default_value_t = 7_500_000.)]
    tuition_fees: f64,

    /// Annual loan interest rate in percent
    #[arg(long, default_value_t = 10.)]
    interest_rate: f64,

    /// Expected annual salary after graduation
    #[arg(long, default_value_t = 6_000_000.)]
    salary: f64,

    /// Grace period in months
    #[arg(long, default_value_t = 12)]
    grace_period: u32,

    /// Loan term in years
    #[arg(long, default_value_t = 10, value_parser = clap::value_parser!(u32).range(1..))]
    loan_term: u32,

    /// Expected annual salary increment in percent
    #[arg(long, default_value_t = 5.)]
    salary_growth: f64,

    /// Extra payment made at the end of every year
    #[arg(long, default_value_t = 50_000.)]
    extra_payment: f64,

    /// Percentage of salary allocated to loan repayment
    #[arg(long, default_value_t = 30.)]
    allocation: f64,

    #[arg(long, value_enum, default_value_t = CurrencyArg::Inr)]
    currency: CurrencyArg,

    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Table)]
    format: OutputFormat,

    /// Number of schedule rows to print in table format
    #[arg(long)]
    rows: Option<usize>,

    /// Loan start date (YYYY-MM-DD); adds a due date to each schedule month
    #[arg(long)]
    start_date: Option<NaiveDate>,

    /// Increase log verbosity (-v info, -vv trace)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum CurrencyArg {
    Inr,
    Usd,
    Eur,
    Gbp,
}

impl From<CurrencyArg> for Currency {
    fn from(arg: CurrencyArg) -> Self {
        match arg {
            CurrencyArg::Inr => Currency::Inr,
            CurrencyArg::Usd => Currency::Usd,
            CurrencyArg::Eur => Currency::Eur,
            CurrencyArg::Gbp => Currency::Gbp,
        }
    }
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum OutputFormat {
    Table,
    Csv,
    /// Requires the `serde` feature
    Json,
}

impl Cli {
    fn parameters(&self) -> LoanParameters {
        LoanParameters {
            tuition_fees: self.tuition_fees,
            annual_interest_rate_percent: self.interest_rate,
            annual_salary: self.salary,
            grace_period_months: self.grace_period,
            loan_term_years: self.loan_term,
            salary_growth_rate_percent: self.salary_growth,
            extra_annual_payment: self.extra_payment,
            allocation_fraction: self.allocation / 100.,
        }
    }

    fn log_level(&self) -> log::LevelFilter {
        match self.verbose {
            0 => log::LevelFilter::Warn,
            1 => log::LevelFilter::Info,
            _ => log::LevelFilter::Trace,
        }
    }
}

fn main() {
    let cli = Cli::parse();

    if let Err(e) = SimpleLogger::new().with_level(cli.log_level()).env().init() {
        eprintln!("error: failed to initialise logging: {}", e);
    }

    let stdout = io::stdout();
    let mut out = stdout.lock();
    match run(&cli, &mut out) {
        Ok(rows) => info!("wrote {} schedule rows", rows),
        Err(e) => {
            eprintln!("error: {}", e);
            process::exit(1);
        }
    }
}

/// Calculates and renders the plan. Nothing is written when the calculation
/// fails. Returns the number of schedule months.
fn run<W: Write>(cli: &Cli, out: &mut W) -> Result<usize, Box<dyn Error>> {
    let params = cli.parameters();
    let result = calculate(&params)?;

    let due_dates = cli
        .start_date
        .map(|start| DueDates::new(start, params.grace_period_months));

    render(out, cli, &params, &result, due_dates.as_ref())
        .map_err(|e| format!("failed to write output: {}", e))?;
    Ok(result.months_to_repay())
}

fn render<W: Write>(
    out: &mut W,
    cli: &Cli,
    params: &LoanParameters,
    result: &CalculationResult,
    due_dates: Option<&DueDates>,
) -> io::Result<()> {
    match cli.format {
        OutputFormat::Table => {
            report::write_table(out, result, cli.currency.into(), due_dates, cli.rows)
        }
        OutputFormat::Csv => report::write_csv(out, result, due_dates),
        OutputFormat::Json => write_json(out, cli.currency.into(), params, result),
    }
}

#[cfg(feature = "serde")]
fn write_json<W: Write>(
    out: &mut W,
    currency: Currency,
    params: &LoanParameters,
    result: &CalculationResult,
) -> io::Result<()> {
    let value = serde_json::json!({
        "currency": currency,
        "parameters": params,
        "result": result,
    });
    serde_json::to_writer_pretty(&mut *out, &value).map_err(io::Error::from)?;
    writeln!(out)
}

#[cfg(not(feature = "serde"))]
fn write_json<W: Write>(
    _out: &mut W,
    _currency: Currency,
    _params: &LoanParameters,
    _result: &CalculationResult,
) -> io::Result<()> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "json output requires the `serde` feature",
    ))
}

// verifies that types can implement the gated traits below
#[cfg(test)]
fn is_normal<T: Sized + Send + Sync + Unpin>() {}

#[test]
fn normal_types() {
    is_normal::<loan_planner::RepaymentMonthRecord>();
    is_normal::<CalculationResult>();
    is_normal::<loan_planner::loan::RepaymentSimulator>();
}

#[test]
fn cli_defaults_match_form() {
    let cli = Cli::parse_from(["loan_planner"]);
    assert_eq!(cli.parameters(), LoanParameters::default());
    assert!(Cli::try_parse_from(["loan_planner", "--loan-term", "0"]).is_err());
}

#[test]
fn insufficient_allocation_renders_nothing() {
    let cli = Cli::parse_from([
        "loan_planner",
        "--allocation",
        "0",
        "--extra-payment",
        "0",
    ]);
    let mut out = Vec::new();
    let err = run(&cli, &mut out).unwrap_err();

    let message = format!("error: {}", err);
    assert!(message.starts_with(
        "error: Insufficient allocation for repayment. Loan balance will never reduce."
    ));
    assert!(err.to_string().contains("month 1:"));
    assert!(out.is_empty());
}

#[test]
fn run_writes_csv_schedule() {
    let cli = Cli::parse_from(["loan_planner", "--format", "csv"]);
    let mut out = Vec::new();
    let rows = run(&cli, &mut out).unwrap();

    assert_eq!(rows, 63);
    let text = String::from_utf8(out).unwrap();
    assert_eq!(text.lines().count(), 64);
    assert!(text.starts_with("Month,Monthly Payment,"));
}
