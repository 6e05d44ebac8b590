use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures_util::future::{BoxFuture, FutureExt};

use crate::{AccountId, Result};

/// Encoded public key of an operator. The key algorithm is opaque here.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct PublicKey(Vec<u8>);

impl PublicKey {
    /// Wraps raw key bytes.
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    /// Raw key bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(&self.0))
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({self})")
    }
}

/// Async signing function: message bytes in, signature bytes out.
pub type TransactionSigner = Arc<dyn Fn(Vec<u8>) -> BoxFuture<'static, Result<Vec<u8>>> + Send + Sync>;

/// Signing identity attached to a request.
///
/// Requests that sign on demand invoke [`Operator::sign`] on every attempt, so
/// one operator can re-sign a body that changes between attempts.
#[derive(Clone)]
pub struct Operator {
    account_id: AccountId,
    public_key: PublicKey,
    signer: TransactionSigner,
}

impl fmt::Debug for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Operator")
            .field("account_id", &self.account_id)
            .field("public_key", &self.public_key)
            .field("signer", &"<signer>")
            .finish()
    }
}

impl Operator {
    pub fn new<F, Fut>(account_id: AccountId, public_key: PublicKey, signer: F) -> Self
    where
        F: Fn(Vec<u8>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Vec<u8>>> + Send + 'static,
    {
        Self::with_signer(
            account_id,
            public_key,
            Arc::new(move |message| signer(message).boxed()),
        )
    }

    /// Creates an operator from an already shared signer.
    pub fn with_signer(
        account_id: AccountId,
        public_key: PublicKey,
        signer: TransactionSigner,
    ) -> Self {
        Self {
            account_id,
            public_key,
            signer,
        }
    }

    /// Paying account.
    pub fn account_id(&self) -> AccountId {
        self.account_id
    }

    /// Key matching the signer.
    pub fn public_key(&self) -> &PublicKey {
        &self.public_key
    }

    pub async fn sign(&self, message: &[u8]) -> Result<Vec<u8>> {
        (self.signer)(message.to_vec()).await
    }
}
