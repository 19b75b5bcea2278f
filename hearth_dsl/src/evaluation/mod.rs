//! Evaluation - AST to effects against a device store
//!
//! The store is an injected collaborator (`store::DeviceStore`); the
//! evaluator knows nothing about how it keeps or transports device state.

mod error;
mod evaluator;
mod result;
mod scope;
pub mod store;
mod trigger;
pub mod value;

pub use error::{RuntimeError, RuntimeResult};
pub use evaluator::Evaluator;
pub use result::{EvalResult, Reading};
pub use scope::Scope;
pub use store::{
    Condition, DeviceAddress, DeviceStore, Firing, FiringCause, PathPattern, RegistrationId,
    StoreError, TriggerCallback,
};
pub use trigger::Trigger;
pub use value::Value;
