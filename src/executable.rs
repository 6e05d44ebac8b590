use std::fmt;
use std::future::Future;

use futures_util::future::BoxFuture;

use crate::{AccountId, Client, Error, Network, NodeAccountIds, Operator, Result, TransportError};

/// Outcome of inspecting one attempt's response.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ExecutionState {
    /// The response is final; map it into the output.
    Finished,
    /// Transient application failure; back off and try again.
    Retry,
    /// Terminal application failure; map it into an error.
    Error,
}

/// In-flight transport call. `'static` so the executor can abandon it on deadline.
pub type DispatchFuture<R> = BoxFuture<'static, std::result::Result<R, TransportError>>;

/// Per-attempt inputs handed to [`Executable::make_request`].
#[derive(Clone, Copy, Debug)]
pub struct AttemptContext<'a> {
    /// 1-based attempt number.
    pub attempt: usize,
    /// Node the request is about to be sent to.
    pub node_account_id: AccountId,
    /// Signing identity, when one is attached to the request.
    pub operator: Option<&'a Operator>,
    /// Whether the request body is (re-)signed on every attempt.
    pub sign_on_demand: bool,
}

/// Protocol-specific steps of a request, driven by [`crate::Executor`].
///
/// A concrete query or transaction implements this trait; the executor owns
/// the retry loop, node selection and deadlines.
pub trait Executable: Send + Sync {
    /// Wire request for a single attempt.
    type Request: Clone + Send + Sync + 'static;
    /// Raw wire response.
    type Response: Send + Sync + 'static;
    /// Typed result handed to the caller.
    type Output: Send;
    /// Application-level status carried by responses.
    type Status: fmt::Display + Send;
    /// Transport handle borrowed from the node for one call.
    type Channel: Send + 'static;

    /// One-time pre-flight work, such as fetching the cost of a paid query.
    fn before_execute<N>(&mut self, client: &Client<N>) -> impl Future<Output = Result<()>> + Send
    where
        N: Network,
    {
        let _ = client;
        async { Ok(()) }
    }

    /// Builds (and signs, if needed) the request for one attempt.
    fn make_request(
        &mut self,
        ctx: &AttemptContext<'_>,
    ) -> impl Future<Output = Result<Self::Request>> + Send;

    /// Issues exactly one transport call.
    fn dispatch(&self, channel: Self::Channel, request: Self::Request)
        -> DispatchFuture<Self::Response>;

    /// Decides what to do with a response. Must not mutate shared state.
    fn should_retry(
        &self,
        request: &Self::Request,
        response: &Self::Response,
    ) -> (Option<Self::Status>, ExecutionState);

    /// Maps a [`ExecutionState::Finished`] response into the output.
    fn map_response(
        &self,
        response: Self::Response,
        node_account_id: AccountId,
        request: Self::Request,
    ) -> impl Future<Output = Result<Self::Output>> + Send;

    /// Maps an [`ExecutionState::Error`] response into an error.
    fn map_status_error(&self, request: &Self::Request, response: &Self::Response) -> Error;

    /// Node for the current attempt when the candidate list is locked.
    fn node_account_id(&self, nodes: &NodeAccountIds) -> Option<AccountId> {
        nodes.current().copied()
    }

    /// Label correlating log lines of one request.
    fn log_id(&self) -> String;

    /// Wire bytes of `request`, for trace logging.
    fn request_to_bytes(&self, request: &Self::Request) -> Vec<u8>;

    /// Wire bytes of `response`, for trace logging.
    fn response_to_bytes(&self, response: &Self::Response) -> Vec<u8>;
}
