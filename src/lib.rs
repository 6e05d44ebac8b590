//! `ledger-executor` is the request-execution core of a ledger network client.
//!
//! A concrete query or transaction implements [`Executable`]; wrapping it in
//! an [`Executor`] gives it:
//! - node selection, either pinned round-robin or picked from the [`Network`]
//! - transport failure classification and immediate failover
//! - exponential backoff on application-level retries
//! - a whole-operation timeout and a per-call deadline
//!
//! [`ManagedNetwork`] and [`HttpChannel`] are ready-made collaborators for
//! networks reachable over gRPC-web.

mod account;
mod backoff;
mod channel;
mod client;
mod error;
mod executable;
mod executor;
mod network;
mod node_list;
mod operator;
mod options;
mod retry;
mod signer;
mod status;

pub use account::AccountId;
pub use backoff::delay_for_attempt;
pub use channel::HttpChannel;
pub use client::Client;
pub use error::{Error, LastError};
pub use executable::{AttemptContext, DispatchFuture, Executable, ExecutionState};
pub use executor::Executor;
pub use network::{
    ManagedNetwork, ManagedNode, Network, Node, DEFAULT_NODE_MAX_BACKOFF, DEFAULT_NODE_MIN_BACKOFF,
};
pub use node_list::NodeAccountIds;
pub use operator::{Operator, PublicKey, TransactionSigner};
pub use options::{ClientOptions, DEFAULT_MAX_ATTEMPTS};
pub use retry::should_retry_transport;
pub use signer::Signer;
pub use status::{TransportError, TransportStatus};

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;
