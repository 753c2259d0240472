//! The shard ledger service.
//!
//! [`Ledger`] owns the shard-supply rules and drives every ownership change
//! through two phases: the call is submitted to the chain and confirmed, then
//! the mirrored change is applied to the store in one transaction. Requests
//! touching the same property are serialised by a keyed lock.

mod locks;
mod request;
mod service;

pub mod error;

pub use error::{Error, Result};
pub use request::{
  BurnRequest, BuyRequest, MintRequest, ProposalRequest, RegisterProperty,
  TransferKind, TransferRequest, UnlockRequest,
};
pub use service::{ConfirmPolicy, Ledger, ReconcileReport, Settled};

#[cfg(test)]
mod tests;
