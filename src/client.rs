use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::{
    AccountId, ClientOptions, Executable, Executor, Network, Node, Operator, PublicKey, Result,
    Signer, DEFAULT_MAX_ATTEMPTS,
};

/// Shared execution context: the network plus defaults for every request.
pub struct Client<N> {
    network: Arc<N>,
    options: ClientOptions,
    operator: Option<Operator>,
}

impl<N> Clone for Client<N> {
    fn clone(&self) -> Self {
        Self {
            network: Arc::clone(&self.network),
            options: self.options.clone(),
            operator: self.operator.clone(),
        }
    }
}

impl<N> fmt::Debug for Client<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("options", &self.options)
            .field("operator", &self.operator)
            .finish_non_exhaustive()
    }
}

impl<N: Network> Client<N> {
    /// Creates a client over `network` with default options and no operator.
    pub fn new(network: N) -> Self {
        Self::from_shared(Arc::new(network))
    }

    /// Creates a client over a network shared with other clients.
    pub fn from_shared(network: Arc<N>) -> Self {
        Self {
            network,
            options: ClientOptions::default(),
            operator: None,
        }
    }

    /// Applies execution defaults after validating them.
    pub fn with_options(mut self, options: ClientOptions) -> Result<Self> {
        options.validate()?;
        self.options = options;
        Ok(self)
    }

    /// Sets the operator adopted by requests that carry none of their own.
    pub fn set_operator<F, Fut>(
        &mut self,
        account_id: AccountId,
        public_key: PublicKey,
        signer: F,
    ) -> &mut Self
    where
        F: Fn(Vec<u8>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Vec<u8>>> + Send + 'static,
    {
        self.operator = Some(Operator::new(account_id, public_key, signer));
        self
    }

    /// Sets the default operator adopted by requests that carry none.
    pub fn with_operator(mut self, operator: Operator) -> Self {
        self.operator = Some(operator);
        self
    }

    /// The shared node registry.
    pub fn network(&self) -> &N {
        &self.network
    }

    /// Execution defaults applied to requests that do not override them.
    pub fn options(&self) -> &ClientOptions {
        &self.options
    }

    /// Default operator, if one was set.
    pub fn operator(&self) -> Option<&Operator> {
        self.operator.as_ref()
    }

    /// Default whole-operation timeout.
    pub fn request_timeout(&self) -> Option<Duration> {
        self.options.request_timeout()
    }

    /// Default lower bound of the retry delay.
    pub fn min_backoff(&self) -> Duration {
        self.options.min_backoff()
    }

    /// Default upper bound of the retry delay.
    pub fn max_backoff(&self) -> Duration {
        self.options.max_backoff()
    }

    /// Client-level attempt limit, if configured.
    pub fn max_attempts(&self) -> Option<usize> {
        self.options.max_attempts
    }

    /// Attempt limit a request without its own limit would use.
    pub fn effective_max_attempts(&self) -> usize {
        self.options.max_attempts.unwrap_or(DEFAULT_MAX_ATTEMPTS)
    }
}

/// A client signs by executing the request against its own network.
impl<N, E> Signer<E> for Client<N>
where
    N: Network,
    N::Node: Node<Channel = E::Channel>,
    E: Executable,
{
    async fn call(&self, request: &mut Executor<E>) -> Result<E::Output> {
        request.execute(self, None).await
    }
}

#[cfg(test)]
mod tests {
    use super::Client;
    use crate::{AccountId, ClientOptions, Error, ManagedNetwork, PublicKey};
    use std::time::Duration;

    fn client() -> Client<ManagedNetwork<()>> {
        Client::new(ManagedNetwork::new([]))
    }

    #[test]
    fn defaults_come_from_options() {
        let client = client();
        assert_eq!(client.request_timeout(), None);
        assert_eq!(client.min_backoff(), Duration::from_millis(250));
        assert_eq!(client.max_backoff(), Duration::from_secs(8));
        assert_eq!(client.max_attempts(), None);
        assert_eq!(client.effective_max_attempts(), 10);
    }

    #[test]
    fn with_options_validates() {
        let err = client()
            .with_options(ClientOptions {
                min_backoff_ms: 10,
                max_backoff_ms: 5,
                ..ClientOptions::default()
            })
            .expect_err("must fail");
        assert!(matches!(err, Error::InvalidConfig(_)));
    }

    #[test]
    fn debug_redacts_operator_signer() {
        let mut client = client();
        client.set_operator(
            AccountId::from_num(2),
            PublicKey::from_bytes([1, 2]),
            |message: Vec<u8>| async move { Ok(message) },
        );
        let debug = format!("{client:?}");
        assert!(debug.contains("<signer>"));
        assert_eq!(
            client.operator().map(|op| op.account_id()),
            Some(AccountId::from_num(2))
        );
    }
}
