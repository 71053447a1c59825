use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CalcError {
    #[error(
        "Insufficient allocation for repayment. Loan balance will never reduce. \
         (month {month}: payment {allocation:.2} does not cover interest {interest:.2})"
    )]
    InsufficientPayment {
        month: u32,
        allocation: f64,
        interest: f64,
    },

    #[error("Runaway computation: loan still outstanding after {months} months")]
    RunawayComputation { months: u32 },

    #[error("Numeric overflow in {context}")]
    NumericOverflow { context: String },

    #[error("Invalid input: {field} - {reason}")]
    InvalidInput { field: String, reason: String },
}

impl CalcError {
    pub(crate) fn invalid(field: &str, reason: &str) -> Self {
        CalcError::InvalidInput {
            field: field.to_string(),
            reason: reason.to_string(),
        }
    }
}
