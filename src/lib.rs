pub mod error;
pub mod loan;
pub mod report;

pub use error::CalcError;
pub use loan::{calculate, CalculationResult, LoanParameters, RepaymentMonthRecord};
