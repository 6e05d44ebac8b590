use crate::{AccountId, Error, Result};

#[derive(Clone, Debug, PartialEq, Eq)]
enum State {
    /// Ids staged by the caller, or the single node picked for the in-flight attempt.
    Unlocked(Vec<AccountId>),
    /// Caller-pinned candidates, visited round-robin.
    Locked { ids: Vec<AccountId>, cursor: usize },
}

/// Candidate nodes for a request.
///
/// While unlocked the list is rebuilt from the network on every attempt.
/// Once locked the membership is fixed for the life of the request and the
/// cursor walks it round-robin.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NodeAccountIds {
    state: State,
}

impl Default for NodeAccountIds {
    fn default() -> Self {
        Self {
            state: State::Unlocked(Vec::new()),
        }
    }
}

impl NodeAccountIds {
    /// An empty, unlocked list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the contents without locking.
    pub fn set_list(&mut self, ids: Vec<AccountId>) -> Result<&mut Self> {
        match &mut self.state {
            State::Unlocked(current) => *current = ids,
            State::Locked { .. } => return Err(Error::NodeListLocked),
        }
        Ok(self)
    }

    /// Pins the current contents. Locking is permanent.
    pub fn set_locked(&mut self) -> &mut Self {
        if let State::Unlocked(ids) = &mut self.state {
            let ids = std::mem::take(ids);
            self.state = State::Locked { ids, cursor: 0 };
        }
        self
    }

    /// Whether the list is frozen for execution.
    pub fn is_locked(&self) -> bool {
        matches!(self.state, State::Locked { .. })
    }

    pub fn is_empty(&self) -> bool {
        self.list().is_empty()
    }

    /// Number of candidates.
    pub fn len(&self) -> usize {
        self.list().len()
    }

    /// The candidates in order.
    pub fn list(&self) -> &[AccountId] {
        match &self.state {
            State::Unlocked(ids) | State::Locked { ids, .. } => ids,
        }
    }

    /// The id at the cursor; for an unlocked list, its single entry.
    pub fn current(&self) -> Option<&AccountId> {
        match &self.state {
            State::Unlocked(ids) => ids.first(),
            State::Locked { ids, cursor } => ids.get(*cursor),
        }
    }

    /// Moves the cursor to the next candidate, wrapping at the end.
    pub fn advance(&mut self) -> &mut Self {
        if let State::Locked { ids, cursor } = &mut self.state {
            if !ids.is_empty() {
                *cursor = (*cursor + 1) % ids.len();
            }
        }
        self
    }

    /// Records the node chosen from the network for an unlocked attempt.
    pub(crate) fn select(&mut self, id: AccountId) {
        if let State::Unlocked(ids) = &mut self.state {
            ids.clear();
            ids.push(id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::NodeAccountIds;
    use crate::{AccountId, Error};

    fn ids(nums: &[u64]) -> Vec<AccountId> {
        nums.iter().copied().map(AccountId::from_num).collect()
    }

    #[test]
    fn set_list_does_not_lock() {
        let mut list = NodeAccountIds::new();
        list.set_list(ids(&[3, 4])).expect("unlocked list accepts ids");
        assert!(!list.is_locked());
        assert_eq!(list.len(), 2);
    }

    #[test]
    fn locked_list_rejects_replacement() {
        let mut list = NodeAccountIds::new();
        list.set_list(ids(&[3, 4])).unwrap().set_locked();
        let err = list.set_list(ids(&[5])).expect_err("locked list is fixed");
        assert!(matches!(err, Error::NodeListLocked));
        assert_eq!(list.list(), ids(&[3, 4]).as_slice());
    }

    #[test]
    fn locked_cursor_visits_every_member_before_repeating() {
        let mut list = NodeAccountIds::new();
        list.set_list(ids(&[3, 4, 5])).unwrap().set_locked();

        let mut seen = Vec::new();
        for _ in 0..6 {
            seen.push(*list.current().expect("non-empty"));
            list.advance();
        }
        assert_eq!(seen, ids(&[3, 4, 5, 3, 4, 5]));
        assert_eq!(list.list(), ids(&[3, 4, 5]).as_slice());
    }

    #[test]
    fn select_keeps_exactly_one_unlocked_candidate() {
        let mut list = NodeAccountIds::new();
        list.set_list(ids(&[3, 4])).unwrap();
        list.select(AccountId::from_num(9));
        assert_eq!(list.list(), ids(&[9]).as_slice());
        list.select(AccountId::from_num(10));
        assert_eq!(list.list(), ids(&[10]).as_slice());
        list.advance();
        assert_eq!(list.current(), Some(&AccountId::from_num(10)));
    }

    #[test]
    fn select_is_ignored_once_locked() {
        let mut list = NodeAccountIds::new();
        list.set_list(ids(&[3])).unwrap().set_locked();
        list.select(AccountId::from_num(9));
        assert_eq!(list.list(), ids(&[3]).as_slice());
    }

    #[test]
    fn locking_twice_keeps_cursor() {
        let mut list = NodeAccountIds::new();
        list.set_list(ids(&[3, 4])).unwrap().set_locked();
        list.advance();
        list.set_locked();
        assert_eq!(list.current(), Some(&AccountId::from_num(4)));
    }

    #[test]
    fn empty_locked_list_has_no_current() {
        let mut list = NodeAccountIds::new();
        list.set_locked().advance();
        assert!(list.is_locked());
        assert!(list.is_empty());
        assert_eq!(list.current(), None);
    }
}
