use std::future::Future;

use crate::{Executable, Executor, Result};

/// External capability that takes over execution of a request,
/// for example a wallet that signs and submits on the caller's behalf.
pub trait Signer<E: Executable>: Send + Sync {
    /// Executes `request` on the signer's behalf.
    fn call(&self, request: &mut Executor<E>) -> impl Future<Output = Result<E::Output>> + Send;
}
