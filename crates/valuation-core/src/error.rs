use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValuationError {
    #[error("Ticker not found: {0}")]
    NotFound(String),

    #[error("No financial data available for this ticker")]
    NoFinancialData,

    #[error("No cash flow data available for this ticker")]
    NoCashFlowData,

    #[error(
        "Discount rate ({discount_rate}) must be greater than the perpetual growth rate ({terminal_growth_rate})"
    )]
    InvalidTerminalAssumption {
        discount_rate: f64,
        terminal_growth_rate: f64,
    },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Error fetching data: {0}")]
    UpstreamFailure(String),
}
