//! Operation identifiers
//!
//! An [`OpId`] is a Lamport-style stamp: a logical counter plus the origin that
//! produced it. Ids are totally ordered so concurrent edits from different origins
//! can be ranked without coordination.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

const ROOT_STR: &str = "root";

/// Causal operation identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OpId {
    pub counter: u64,
    pub origin_id: String,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("malformed op id {input:?}: {reason}")]
pub struct OpIdParseError {
    pub input: String,
    pub reason: &'static str,
}

impl OpId {
    pub fn new(counter: u64, origin_id: impl Into<String>) -> Self {
        Self {
            counter,
            origin_id: origin_id.into(),
        }
    }

    /// The sentinel `{0, ""}`, printed as `"root"`.
    pub fn root() -> Self {
        Self::new(0, "")
    }

    pub fn is_root(&self) -> bool {
        self.counter == 0 && self.origin_id.is_empty()
    }

    /// Parse `"root"` or `"<counter>@<origin>"`.
    pub fn parse(s: &str) -> Result<Self, OpIdParseError> {
        let err = |reason| OpIdParseError {
            input: s.to_string(),
            reason,
        };

        if s == ROOT_STR {
            return Ok(Self::root());
        }

        let (counter, origin) = s.split_once('@').ok_or_else(|| err("missing '@'"))?;
        if origin.is_empty() {
            return Err(err("empty origin id"));
        }
        if origin.contains('@') {
            return Err(err("origin id contains '@'"));
        }
        if counter.is_empty() || !counter.bytes().all(|b| b.is_ascii_digit()) {
            return Err(err("counter is not a decimal integer"));
        }
        let counter = counter
            .parse::<u64>()
            .map_err(|_| err("counter out of range"))?;

        Ok(Self::new(counter, origin))
    }

    pub fn is_greater_than(&self, other: &OpId) -> bool {
        self > other
    }
}

impl Ord for OpId {
    fn cmp(&self, other: &Self) -> Ordering {
        self.counter
            .cmp(&other.counter)
            .then_with(|| self.origin_id.cmp(&other.origin_id))
    }
}

impl PartialOrd for OpId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for OpId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_root() {
            f.write_str(ROOT_STR)
        } else {
            write!(f, "{}@{}", self.counter, self.origin_id)
        }
    }
}

impl FromStr for OpId {
    type Err = OpIdParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OpId::parse(s)
    }
}

impl Serialize for OpId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for OpId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        OpId::parse(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn op_id() -> impl Strategy<Value = OpId> {
        (0u64..20, "[a-c]{0,3}").prop_map(|(counter, origin)| OpId::new(counter, origin))
    }

    fn well_formed_op_id() -> impl Strategy<Value = OpId> {
        (any::<u64>(), "[A-Za-z0-9_-]{1,16}").prop_map(|(counter, origin)| OpId::new(counter, origin))
    }

    #[test]
    fn test_root_formats_and_parses() {
        assert_eq!(OpId::root().to_string(), "root");
        assert_eq!(OpId::parse("root").unwrap(), OpId::root());
        assert!(OpId::parse("root").unwrap().is_root());
    }

    #[test]
    fn test_counter_dominates_origin() {
        let a = OpId::new(1, "zzz");
        let b = OpId::new(2, "aaa");
        assert!(a < b);
        assert!(b.is_greater_than(&a));
    }

    #[test]
    fn test_origin_breaks_ties() {
        let a = OpId::new(5, "A");
        let b = OpId::new(5, "B");
        assert_eq!(a.cmp(&b), Ordering::Less);
        assert_eq!(b.cmp(&a), Ordering::Greater);
        assert_eq!(a.cmp(&a.clone()), Ordering::Equal);
    }

    #[test]
    fn test_malformed_ids_are_errors() {
        for input in ["", "12", "@A", "x@A", "1@", "1@A@B", "-1@A", "99999999999999999999@A"] {
            assert!(OpId::parse(input).is_err(), "expected error for {input:?}");
        }
    }

    #[test]
    fn test_serde_uses_string_form() {
        let id = OpId::new(42, "peer");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"42@peer\"");
        let back: OpId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }

    proptest! {
        #[test]
        fn prop_round_trip(id in well_formed_op_id()) {
            prop_assert_eq!(OpId::parse(&id.to_string()).unwrap(), id);
        }

        #[test]
        fn prop_trichotomy(a in op_id(), b in op_id()) {
            let lt = a < b;
            let eq = a == b;
            let gt = a > b;
            prop_assert_eq!(lt as u8 + eq as u8 + gt as u8, 1);
            prop_assert_eq!(a.cmp(&b), b.cmp(&a).reverse());
        }

        #[test]
        fn prop_transitive(a in op_id(), b in op_id(), c in op_id()) {
            if a <= b && b <= c {
                prop_assert!(a <= c);
            }
            if a < b && b < c {
                prop_assert!(a < c);
            }
        }
    }
}
