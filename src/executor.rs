//! The retry driver shared by every request kind.
//!
//! [`Executor`] owns a request's execution configuration and candidate nodes
//! and runs the attempt loop; the request itself only supplies the
//! protocol-specific steps through [`Executable`].

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, trace};

use crate::{
    backoff::wait_for_attempt, retry::should_retry_transport, AccountId, AttemptContext, Client,
    DispatchFuture, Error, Executable, ExecutionState, LastError, Network, Node, NodeAccountIds,
    Operator, PublicKey, Result, Signer, TransportError, TransportStatus, DEFAULT_MAX_ATTEMPTS,
};

/// A request bound to its execution configuration.
pub struct Executor<E> {
    hooks: E,
    node_account_ids: NodeAccountIds,
    max_attempts: Option<usize>,
    min_backoff: Option<Duration>,
    max_backoff: Option<Duration>,
    request_timeout: Option<Duration>,
    grpc_deadline: Option<Duration>,
    operator: Option<Operator>,
    operator_account_id: Option<AccountId>,
    sign_on_demand: bool,
}

impl<E> fmt::Debug for Executor<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Executor")
            .field("node_account_ids", &self.node_account_ids)
            .field("max_attempts", &self.max_attempts)
            .field("min_backoff", &self.min_backoff)
            .field("max_backoff", &self.max_backoff)
            .field("request_timeout", &self.request_timeout)
            .field("grpc_deadline", &self.grpc_deadline)
            .field("operator", &self.operator)
            .field("operator_account_id", &self.operator_account_id)
            .field("sign_on_demand", &self.sign_on_demand)
            .finish_non_exhaustive()
    }
}

impl<E: Executable> Executor<E> {
    /// Wraps `hooks` with no per-request overrides; everything unset falls
    /// back to the client at execute time.
    pub fn new(hooks: E) -> Self {
        Self {
            hooks,
            node_account_ids: NodeAccountIds::new(),
            max_attempts: None,
            min_backoff: None,
            max_backoff: None,
            request_timeout: None,
            grpc_deadline: None,
            operator: None,
            operator_account_id: None,
            sign_on_demand: false,
        }
    }

    /// The wrapped request.
    pub fn hooks(&self) -> &E {
        &self.hooks
    }

    /// Mutable access to the wrapped request.
    pub fn hooks_mut(&mut self) -> &mut E {
        &mut self.hooks
    }

    /// Unwraps the request, dropping the execution settings.
    pub fn into_hooks(self) -> E {
        self.hooks
    }

    /// Explicit candidate nodes, or `None` when the network picks them.
    ///
    /// Reading a non-empty list locks it, so the returned set is the one
    /// `execute` will use.
    pub fn node_account_ids(&mut self) -> Option<&[AccountId]> {
        if self.node_account_ids.is_empty() {
            return None;
        }
        self.node_account_ids.set_locked();
        Some(self.node_account_ids.list())
    }

    /// Pins the request to these nodes, tried round-robin across attempts.
    pub fn set_node_account_ids(&mut self, ids: Vec<AccountId>) -> Result<&mut Self> {
        self.node_account_ids.set_list(ids)?.set_locked();
        Ok(self)
    }

    /// Attempt limit set on this request, if any.
    pub fn max_attempts(&self) -> Option<usize> {
        self.max_attempts
    }

    /// Caps the number of attempts; zero is rejected.
    pub fn set_max_attempts(&mut self, max_attempts: usize) -> Result<&mut Self> {
        if max_attempts == 0 {
            return Err(Error::InvalidConfig(
                "max attempts must be at least 1".to_owned(),
            ));
        }
        self.max_attempts = Some(max_attempts);
        Ok(self)
    }

    /// Lower bound of the retry delay set on this request, if any.
    pub fn min_backoff(&self) -> Option<Duration> {
        self.min_backoff
    }

    /// Sets the retry delay's lower bound.
    ///
    /// Fails without changing anything when it exceeds an already set max.
    pub fn set_min_backoff(&mut self, min_backoff: Duration) -> Result<&mut Self> {
        if let Some(max) = self.max_backoff {
            if min_backoff > max {
                return Err(Error::InvalidConfig(
                    "min backoff cannot be larger than max backoff".to_owned(),
                ));
            }
        }
        self.min_backoff = Some(min_backoff);
        Ok(self)
    }

    /// Upper bound of the retry delay set on this request, if any.
    pub fn max_backoff(&self) -> Option<Duration> {
        self.max_backoff
    }

    /// Sets the retry delay's upper bound.
    ///
    /// Fails without changing anything when it is below an already set min.
    pub fn set_max_backoff(&mut self, max_backoff: Duration) -> Result<&mut Self> {
        if let Some(min) = self.min_backoff {
            if max_backoff < min {
                return Err(Error::InvalidConfig(
                    "max backoff cannot be smaller than min backoff".to_owned(),
                ));
            }
        }
        self.max_backoff = Some(max_backoff);
        Ok(self)
    }

    /// Per-call deadline each transport call is raced against.
    pub fn grpc_deadline(&self) -> Option<Duration> {
        self.grpc_deadline
    }

    /// Bounds each transport call; a call that overruns is abandoned.
    pub fn set_grpc_deadline(&mut self, deadline: Duration) -> &mut Self {
        self.grpc_deadline = Some(deadline);
        self
    }

    /// Whole-operation timeout for `execute`.
    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout
    }

    /// Bounds the whole `execute` call, checked before each attempt.
    pub fn set_request_timeout(&mut self, timeout: Duration) -> &mut Self {
        self.request_timeout = Some(timeout);
        self
    }

    /// Signing identity used when building each attempt's request.
    pub fn operator(&self) -> Option<&Operator> {
        self.operator.as_ref()
    }

    /// Attaches a signing identity that is re-applied on every attempt.
    pub fn set_operator_with<F, Fut>(
        &mut self,
        account_id: AccountId,
        public_key: PublicKey,
        signer: F,
    ) -> &mut Self
    where
        F: Fn(Vec<u8>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Vec<u8>>> + Send + 'static,
    {
        self.set_operator(Operator::new(account_id, public_key, signer))
    }

    /// Attaches `operator` and records its account as the payer.
    pub fn set_operator(&mut self, operator: Operator) -> &mut Self {
        self.operator_account_id = Some(operator.account_id());
        self.operator = Some(operator);
        self
    }

    /// Account that pays for the request.
    pub fn operator_account_id(&self) -> Option<AccountId> {
        self.operator_account_id
    }

    /// Overrides the paying account without touching the operator.
    pub fn set_operator_account_id(&mut self, account_id: Option<AccountId>) -> &mut Self {
        self.operator_account_id = account_id;
        self
    }

    /// Whether signing is deferred until a request is built.
    pub fn sign_on_demand(&self) -> bool {
        self.sign_on_demand
    }

    /// Defers signing to request construction, per attempt.
    pub fn set_sign_on_demand(&mut self, sign_on_demand: bool) -> &mut Self {
        self.sign_on_demand = sign_on_demand;
        self
    }

    /// Hands the request to `signer`, which drives execution itself.
    pub async fn execute_with_signer<S>(&mut self, signer: &S) -> Result<E::Output>
    where
        S: Signer<E>,
    {
        signer.call(self).await
    }

    /// Executes the request against `client`'s network.
    ///
    /// `request_timeout` applies only when the request has no timeout of its
    /// own; otherwise the client's default is used.
    pub async fn execute<N>(
        &mut self,
        client: &Client<N>,
        request_timeout: Option<Duration>,
    ) -> Result<E::Output>
    where
        N: Network,
        N::Node: Node<Channel = E::Channel>,
    {
        if self.request_timeout.is_none() {
            self.request_timeout = request_timeout.or_else(|| client.request_timeout());
        }

        if self.operator.is_none() {
            if let Some(operator) = client.operator() {
                self.set_operator(operator.clone());
            }
        }

        self.hooks.before_execute(client).await?;

        let max_backoff = self.max_backoff.unwrap_or_else(|| client.max_backoff());
        let min_backoff = self.min_backoff.unwrap_or_else(|| client.min_backoff());
        if min_backoff > max_backoff {
            return Err(Error::InvalidConfig(format!(
                "resolved min backoff {min_backoff:?} exceeds max backoff {max_backoff:?}"
            )));
        }
        self.max_backoff = Some(max_backoff);
        self.min_backoff = Some(min_backoff);
        let max_attempts = self
            .max_attempts
            .or_else(|| client.max_attempts())
            .unwrap_or(DEFAULT_MAX_ATTEMPTS);

        if self.node_account_ids.is_locked() && self.node_account_ids.is_empty() {
            return Err(Error::EmptyNodeList);
        }

        let network = client.network();
        let start = Instant::now();
        let mut persistent_error: Option<LastError> = None;

        for attempt in 1..=max_attempts {
            if let Some(timeout) = self.request_timeout {
                if start + timeout <= Instant::now() {
                    return Err(Error::Timeout);
                }
            }

            let node = self.select_node(network)?;
            let node_account_id = node.account_id();
            let log_id = self.hooks.log_id();
            debug!(
                log_id = %log_id,
                attempt,
                node_account_id = %node_account_id,
                address = node.address(),
                "selected node"
            );

            let channel = node.channel();
            let ctx = AttemptContext {
                attempt,
                node_account_id,
                operator: self.operator.as_ref(),
                sign_on_demand: self.sign_on_demand,
            };
            let request = self.hooks.make_request(&ctx).await?;
            self.node_account_ids.advance();

            // Stalls on the chosen node instead of failing over to another candidate.
            if !node.is_healthy() {
                debug!(
                    log_id = %log_id,
                    node_account_id = %node_account_id,
                    remaining_ms = node.remaining_time().as_millis() as u64,
                    "node is not healthy, waiting for backoff"
                );
                node.backoff().await;
            }

            trace!(
                log_id = %log_id,
                bytes = %hex::encode(self.hooks.request_to_bytes(&request)),
                "sending request"
            );
            let call = self.hooks.dispatch(channel, request.clone());
            let response = match race_deadline(call, self.grpc_deadline, &log_id).await {
                Ok(response) => response,
                Err(err) => {
                    debug!(
                        log_id = %log_id,
                        node_account_id = %node_account_id,
                        status = %err.status,
                        message = %err.message,
                        "received transport error"
                    );
                    let retryable = should_retry_transport(&err);
                    persistent_error = Some(LastError::Transport(err.clone()));
                    if retryable {
                        network.increase_backoff(&node);
                        continue;
                    }
                    return Err(Error::Transport(err));
                }
            };

            trace!(
                log_id = %log_id,
                bytes = %hex::encode(self.hooks.response_to_bytes(&response)),
                "received response"
            );
            network.decrease_backoff(&node);

            let (status, state) = self.hooks.should_retry(&request, &response);
            if let Some(status) = status {
                persistent_error = Some(LastError::Status(status.to_string()));
            }

            match state {
                ExecutionState::Retry => {
                    if attempt < max_attempts {
                        debug!(log_id = %log_id, attempt, "retrying after backoff");
                        wait_for_attempt(attempt, min_backoff, max_backoff).await;
                    }
                }
                ExecutionState::Finished => {
                    return self
                        .hooks
                        .map_response(response, node_account_id, request)
                        .await;
                }
                ExecutionState::Error => {
                    return Err(self.hooks.map_status_error(&request, &response));
                }
            }
        }

        Err(Error::MaxAttemptsExceeded {
            attempts: max_attempts,
            last_error: persistent_error,
        })
    }

    fn select_node<N>(&mut self, network: &N) -> Result<Arc<N::Node>>
    where
        N: Network,
    {
        if self.node_account_ids.is_locked() {
            let id = self
                .hooks
                .node_account_id(&self.node_account_ids)
                .ok_or(Error::EmptyNodeList)?;
            network.node(Some(&id)).ok_or(Error::NodeNotRecognized(id))
        } else {
            let node = network.node(None).ok_or(Error::NoNodeAvailable)?;
            self.node_account_ids.select(node.account_id());
            Ok(node)
        }
    }
}

/// Runs `call`, racing it against `deadline` when one is set.
///
/// A call that loses the race keeps running; its eventual outcome is only
/// logged, never returned.
async fn race_deadline<R>(
    call: DispatchFuture<R>,
    deadline: Option<Duration>,
    log_id: &str,
) -> std::result::Result<R, TransportError>
where
    R: Send + 'static,
{
    let Some(deadline) = deadline else {
        return call.await;
    };

    let mut handle = tokio::spawn(call);
    match tokio::time::timeout(deadline, &mut handle).await {
        Ok(Ok(outcome)) => outcome,
        Ok(Err(join_err)) => {
            if join_err.is_panic() {
                std::panic::resume_unwind(join_err.into_panic());
            }
            Err(TransportError::new(
                TransportStatus::Cancelled,
                join_err.to_string(),
            ))
        }
        Err(_elapsed) => {
            let log_id = log_id.to_owned();
            tokio::spawn(async move {
                match handle.await {
                    Ok(Ok(_)) => debug!(log_id = %log_id, "discarded response received after deadline"),
                    Ok(Err(err)) => {
                        debug!(log_id = %log_id, error = %err, "discarded transport error received after deadline")
                    }
                    Err(err) => debug!(log_id = %log_id, error = %err, "abandoned call did not complete"),
                }
            });
            Err(TransportError::deadline_exceeded(deadline))
        }
    }
}
