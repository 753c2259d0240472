use shard_core::{
  address::TxHash,
  chain::{ChainCall, ChainGateway, TxStatus},
};

use crate::{Error, RelayGateway, Result, SimulatedChain};

/// A gateway chosen at runtime.
pub enum AnyChain {
  Simulated(SimulatedChain),
  Relay(RelayGateway),
}

impl AnyChain {
  pub fn mode(&self) -> &'static str {
    match self {
      Self::Simulated(_) => "simulated",
      Self::Relay(_) => "relay",
    }
  }
}

impl ChainGateway for AnyChain {
  type Error = Error;

  async fn submit(&self, call: ChainCall) -> Result<TxHash> {
    match self {
      Self::Simulated(chain) => chain.submit(call).await,
      Self::Relay(chain) => chain.submit(call).await,
    }
  }

  async fn status(&self, tx_hash: &TxHash) -> Result<TxStatus> {
    match self {
      Self::Simulated(chain) => chain.status(tx_hash).await,
      Self::Relay(chain) => chain.status(tx_hash).await,
    }
  }
}
