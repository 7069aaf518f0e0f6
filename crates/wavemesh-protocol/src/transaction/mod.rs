pub mod constants;
pub mod outcome;
pub mod state;

pub use outcome::Outcome;
pub use state::{
    Priority, RetryDecision, RetryInput, Transaction, TxId, TxPurpose, TxRequest, TxState,
    compute_ack_deadline, decide_retry,
};
