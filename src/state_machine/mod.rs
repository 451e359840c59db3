//! State machines for filing transactions and the enums shared by the
//! credential, token, and voyage lifecycles.

pub mod errors;
pub mod events;
pub mod states;
pub mod transaction_state_machine;

pub use errors::{StateMachineError, StateMachineResult};
pub use events::FilingEvent;
pub use states::{CredentialState, TokenState, TransactionState, VoyageFilingState};
pub use transaction_state_machine::{check_guards, target_state, TransactionStateMachine};
