//! Item identifier.
//!
//! ULID ベース。生成時刻でソートでき、調整なしで生成できる。

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use ulid::Ulid;

const PREFIX: &str = "ntf-";

/// Identifier of a queued notification.
///
/// Displayed as `ntf-<ulid>`; parses from either that form or a bare ULID.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ItemId(Ulid);

impl ItemId {
    pub fn from_ulid(ulid: Ulid) -> Self {
        Self(ulid)
    }

    pub fn as_ulid(&self) -> Ulid {
        self.0
    }
}

impl From<Ulid> for ItemId {
    fn from(ulid: Ulid) -> Self {
        Self::from_ulid(ulid)
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{PREFIX}{}", self.0)
    }
}

impl FromStr for ItemId {
    type Err = ulid::DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = s.strip_prefix(PREFIX).unwrap_or(s);
        Ulid::from_string(raw).map(Self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_carries_prefix_and_parses_back() {
        let id = ItemId::from_ulid(Ulid::new());
        let shown = id.to_string();
        assert!(shown.starts_with("ntf-"));
        assert_eq!(shown.parse::<ItemId>().unwrap(), id);
    }

    #[test]
    fn bare_ulid_parses() {
        let ulid = Ulid::new();
        let id: ItemId = ulid.to_string().parse().unwrap();
        assert_eq!(id.as_ulid(), ulid);
    }

    #[test]
    fn garbage_is_rejected() {
        assert!("ntf-not-a-ulid".parse::<ItemId>().is_err());
    }

    #[test]
    fn same_size_as_ulid() {
        assert_eq!(std::mem::size_of::<ItemId>(), std::mem::size_of::<Ulid>());
    }
}
