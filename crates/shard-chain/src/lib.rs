//! Chain gateways for the Shardhold ledger.
//!
//! [`SimulatedChain`] runs an in-process model of the property contract and
//! is used for development and tests. [`RelayGateway`] forwards calls as JSON
//! to a signing relay that owns the hot wallet. [`AnyChain`] picks one at
//! startup from configuration.

mod any;
mod relay;
mod simulated;

pub mod error;

pub use any::AnyChain;
pub use error::{Error, Result};
pub use relay::{RelayConfig, RelayGateway};
pub use simulated::{Behaviour, SimulatedChain};
