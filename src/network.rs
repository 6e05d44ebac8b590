//! Network registry seam consumed by the executor, plus a managed
//! implementation with shared per-node backoff state.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::time::Instant;

use crate::{AccountId, HttpChannel};

/// Default lower bound of a node's readmission backoff.
pub const DEFAULT_NODE_MIN_BACKOFF: Duration = Duration::from_secs(8);
/// Default upper bound of a node's readmission backoff.
pub const DEFAULT_NODE_MAX_BACKOFF: Duration = Duration::from_secs(60 * 60);

/// One addressable endpoint of the network.
pub trait Node: Send + Sync {
    type Channel: Send + 'static;

    /// Account id the node is registered under.
    fn account_id(&self) -> AccountId;

    /// Endpoint address, for diagnostics.
    fn address(&self) -> &str;

    /// Whether the node is outside its backoff window.
    fn is_healthy(&self) -> bool;

    /// Time left until the node is readmitted; zero when healthy.
    fn remaining_time(&self) -> Duration;

    /// Resolves once the node's backoff window has elapsed.
    fn backoff(&self) -> impl Future<Output = ()> + Send;

    /// Transport handle passed to a request's dispatch step.
    fn channel(&self) -> Self::Channel;
}

/// Registry of nodes and owner of their health state.
///
/// Implementations are shared by every concurrent `execute` call, so backoff
/// updates must be safe under concurrent callers.
pub trait Network: Send + Sync {
    type Node: Node;

    /// Looks up `id`, or picks any eligible node when `id` is `None`.
    fn node(&self, id: Option<&AccountId>) -> Option<Arc<Self::Node>>;

    /// Records a retryable transport failure on `node`.
    fn increase_backoff(&self, node: &Self::Node);

    /// Records a response received from `node`.
    fn decrease_backoff(&self, node: &Self::Node);
}

#[derive(Debug)]
struct BackoffState {
    current: Duration,
    readmit_at: Instant,
}

/// Node with lock-protected backoff state.
#[derive(Debug)]
pub struct ManagedNode<C> {
    account_id: AccountId,
    address: String,
    channel: C,
    min_backoff: Duration,
    max_backoff: Duration,
    state: Mutex<BackoffState>,
}

impl<C> ManagedNode<C> {
    /// Creates a healthy node with the default backoff bounds.
    pub fn new(account_id: AccountId, address: impl Into<String>, channel: C) -> Self {
        Self {
            account_id,
            address: address.into(),
            channel,
            min_backoff: DEFAULT_NODE_MIN_BACKOFF,
            max_backoff: DEFAULT_NODE_MAX_BACKOFF,
            state: Mutex::new(BackoffState {
                current: DEFAULT_NODE_MIN_BACKOFF,
                readmit_at: Instant::now(),
            }),
        }
    }

    /// Overrides the readmission backoff bounds; `min` is clamped to `max`.
    pub fn with_backoff(mut self, min: Duration, max: Duration) -> Self {
        let min = min.min(max);
        self.min_backoff = min;
        self.max_backoff = max;
        self.lock_state().current = min;
        self
    }

    /// Current backoff weight; the next failure keeps the node out this long times two.
    pub fn current_backoff(&self) -> Duration {
        self.lock_state().current
    }

    /// Doubles the backoff (up to the max) and takes the node out of rotation for it.
    pub fn increase_backoff(&self) {
        let mut state = self.lock_state();
        state.current = state.current.saturating_mul(2).min(self.max_backoff);
        state.readmit_at = Instant::now() + state.current;
    }

    /// Halves the backoff, down to the min.
    pub fn decrease_backoff(&self) {
        let mut state = self.lock_state();
        state.current = (state.current / 2).max(self.min_backoff);
    }

    fn readmit_at(&self) -> Instant {
        self.lock_state().readmit_at
    }

    fn lock_state(&self) -> MutexGuard<'_, BackoffState> {
        // The state is plain data; a panic mid-update cannot leave it torn.
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl<C> Node for ManagedNode<C>
where
    C: Clone + Send + Sync + 'static,
{
    type Channel = C;

    fn account_id(&self) -> AccountId {
        self.account_id
    }

    fn address(&self) -> &str {
        &self.address
    }

    fn is_healthy(&self) -> bool {
        self.readmit_at() <= Instant::now()
    }

    fn remaining_time(&self) -> Duration {
        self.readmit_at().saturating_duration_since(Instant::now())
    }

    fn backoff(&self) -> impl Future<Output = ()> + Send {
        tokio::time::sleep_until(self.readmit_at())
    }

    fn channel(&self) -> C {
        self.channel.clone()
    }
}

/// Address book of [`ManagedNode`]s with round-robin selection over healthy nodes.
#[derive(Debug)]
pub struct ManagedNetwork<C> {
    nodes: Vec<Arc<ManagedNode<C>>>,
    by_account: HashMap<AccountId, usize>,
    cursor: AtomicUsize,
}

impl<C> ManagedNetwork<C>
where
    C: Clone + Send + Sync + 'static,
{
    /// Builds a network; a later node with a duplicate account id replaces the earlier one.
    pub fn new(nodes: impl IntoIterator<Item = ManagedNode<C>>) -> Self {
        let mut network = Self {
            nodes: Vec::new(),
            by_account: HashMap::new(),
            cursor: AtomicUsize::new(0),
        };
        for node in nodes {
            let account_id = node.account_id;
            match network.by_account.get(&account_id) {
                Some(&index) => network.nodes[index] = Arc::new(node),
                None => {
                    network.by_account.insert(account_id, network.nodes.len());
                    network.nodes.push(Arc::new(node));
                }
            }
        }
        network
    }

    /// Number of registered nodes.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether no node is registered.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Registered account ids in insertion order.
    pub fn account_ids(&self) -> Vec<AccountId> {
        self.nodes.iter().map(|node| node.account_id).collect()
    }

    fn next_healthy(&self) -> Option<Arc<ManagedNode<C>>> {
        let len = self.nodes.len();
        if len == 0 {
            return None;
        }
        let start = self.cursor.fetch_add(1, Ordering::Relaxed);
        (0..len)
            .map(|offset| &self.nodes[(start + offset) % len])
            .find(|node| node.is_healthy())
            .or_else(|| self.nodes.iter().min_by_key(|node| node.readmit_at()))
            .cloned()
    }
}

impl ManagedNetwork<HttpChannel> {
    /// Builds a network of HTTP channels from `(address, node account id)` pairs.
    ///
    /// Addresses without a scheme are treated as `http://`.
    pub fn for_network<I, A>(addresses: I) -> Self
    where
        I: IntoIterator<Item = (A, AccountId)>,
        A: Into<String>,
    {
        let http = reqwest::Client::new();
        Self::new(addresses.into_iter().map(|(address, account_id)| {
            let address = address.into();
            let channel = HttpChannel::with_client(http.clone(), &address);
            ManagedNode::new(account_id, address, channel)
        }))
    }
}

impl<C> Network for ManagedNetwork<C>
where
    C: Clone + Send + Sync + 'static,
{
    type Node = ManagedNode<C>;

    fn node(&self, id: Option<&AccountId>) -> Option<Arc<ManagedNode<C>>> {
        match id {
            Some(id) => self
                .by_account
                .get(id)
                .map(|&index| Arc::clone(&self.nodes[index])),
            None => self.next_healthy(),
        }
    }

    fn increase_backoff(&self, node: &ManagedNode<C>) {
        node.increase_backoff();
    }

    fn decrease_backoff(&self, node: &ManagedNode<C>) {
        node.decrease_backoff();
    }
}

#[cfg(test)]
mod tests {
    use super::{ManagedNetwork, ManagedNode, Network, Node};
    use crate::AccountId;
    use std::time::Duration;

    const MIN: Duration = Duration::from_millis(100);
    const MAX: Duration = Duration::from_millis(1000);

    fn node(num: u64) -> ManagedNode<()> {
        ManagedNode::new(AccountId::from_num(num), format!("10.0.0.{num}:50211"), ())
            .with_backoff(MIN, MAX)
    }

    #[tokio::test(start_paused = true)]
    async fn increase_backoff_marks_unhealthy_until_readmitted() {
        let node = node(3);
        assert!(node.is_healthy());

        node.increase_backoff();
        assert!(!node.is_healthy());
        assert_eq!(node.current_backoff(), Duration::from_millis(200));
        assert_eq!(node.remaining_time(), Duration::from_millis(200));

        node.backoff().await;
        assert!(node.is_healthy());
        assert_eq!(node.remaining_time(), Duration::ZERO);
    }

    #[test]
    fn backoff_is_bounded_both_ways() {
        let node = node(3);
        for _ in 0..10 {
            node.increase_backoff();
        }
        assert_eq!(node.current_backoff(), MAX);
        for _ in 0..10 {
            node.decrease_backoff();
        }
        assert_eq!(node.current_backoff(), MIN);
    }

    #[test]
    fn lookup_by_id_ignores_health() {
        let network = ManagedNetwork::new([node(3), node(4)]);
        let unhealthy = network.node(Some(&AccountId::from_num(4))).expect("known id");
        network.increase_backoff(&unhealthy);

        let again = network.node(Some(&AccountId::from_num(4))).expect("known id");
        assert_eq!(again.account_id(), AccountId::from_num(4));
        assert!(!again.is_healthy());
        assert!(network.node(Some(&AccountId::from_num(9))).is_none());
    }

    #[test]
    fn any_node_round_robins_over_healthy_nodes() {
        let network = ManagedNetwork::new([node(3), node(4), node(5)]);
        let skipped = network.node(Some(&AccountId::from_num(4))).expect("known id");
        network.increase_backoff(&skipped);

        let picks: Vec<u64> = (0..4)
            .map(|_| network.node(None).expect("healthy node").account_id().num)
            .collect();
        assert!(!picks.contains(&4));
        assert!(picks.contains(&3));
        assert!(picks.contains(&5));
    }

    #[test]
    fn falls_back_to_soonest_readmitted_node() {
        let network = ManagedNetwork::new([node(3), node(4)]);
        let three = network.node(Some(&AccountId::from_num(3))).unwrap();
        let four = network.node(Some(&AccountId::from_num(4))).unwrap();
        network.increase_backoff(&three);
        network.increase_backoff(&three);
        network.increase_backoff(&four);

        let pick = network.node(None).expect("fallback node");
        assert_eq!(pick.account_id(), AccountId::from_num(4));
    }

    #[test]
    fn duplicate_ids_replace_earlier_entries() {
        let network = ManagedNetwork::new([
            node(3),
            ManagedNode::new(AccountId::from_num(3), "replacement:50211", ()),
        ]);
        assert_eq!(network.len(), 1);
        let node = network.node(Some(&AccountId::from_num(3))).unwrap();
        assert_eq!(node.address(), "replacement:50211");
    }

    #[test]
    fn empty_network_offers_nothing() {
        let network = ManagedNetwork::<()>::new([]);
        assert!(network.is_empty());
        assert!(network.node(None).is_none());
    }
}
