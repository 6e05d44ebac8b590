use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer};

use crate::Error;

/// Ledger entity id in `shard.realm.num` form, used for accounts and nodes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AccountId {
    pub shard: u64,
    pub realm: u64,
    pub num: u64,
}

impl AccountId {
    /// Builds an id from its three components.
    pub const fn new(shard: u64, realm: u64, num: u64) -> Self {
        Self { shard, realm, num }
    }

    /// Shorthand for `0.0.num`.
    pub const fn from_num(num: u64) -> Self {
        Self::new(0, 0, num)
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.shard, self.realm, self.num)
    }
}

impl FromStr for AccountId {
    type Err = Error;

    /// Accepts `shard.realm.num` or a bare `num`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || Error::InvalidAccountId(s.to_owned());
        let parts = s
            .trim()
            .split('.')
            .map(|part| part.parse::<u64>().map_err(|_| invalid()))
            .collect::<Result<Vec<_>, _>>()?;

        match parts.as_slice() {
            [num] => Ok(Self::from_num(*num)),
            [shard, realm, num] => Ok(Self::new(*shard, *realm, *num)),
            _ => Err(invalid()),
        }
    }
}

impl<'de> Deserialize<'de> for AccountId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = String::deserialize(deserializer)?;
        value.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::AccountId;
    use crate::Error;

    #[test]
    fn parses_full_and_short_forms() {
        assert_eq!("0.0.3".parse::<AccountId>().unwrap(), AccountId::from_num(3));
        assert_eq!("7".parse::<AccountId>().unwrap(), AccountId::from_num(7));
        assert_eq!(
            " 1.2.3 ".parse::<AccountId>().unwrap(),
            AccountId::new(1, 2, 3)
        );
    }

    #[test]
    fn rejects_malformed_ids() {
        for input in ["", "0.0", "0.0.x", "0.0.3.4", "-1"] {
            let err = input.parse::<AccountId>().expect_err("must fail");
            assert!(matches!(err, Error::InvalidAccountId(_)));
        }
    }

    #[test]
    fn displays_dotted() {
        assert_eq!(AccountId::new(0, 0, 1001).to_string(), "0.0.1001");
    }

    #[test]
    fn deserializes_from_string() {
        let id: AccountId = serde_json::from_str("\"0.0.5\"").expect("must decode");
        assert_eq!(id, AccountId::from_num(5));
    }
}
