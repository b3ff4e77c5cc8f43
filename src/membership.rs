use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::MemberKey;

/// Unordered set of member keys scoped to one relationship.
///
/// On the wire this is a JSON array. An array naming the same key twice is
/// rejected instead of being collapsed, so a malformed backend response is
/// caught where it enters the client.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<MemberKey>", into = "Vec<MemberKey>")]
pub struct MembershipSet(BTreeSet<MemberKey>);

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("member `{0}` appears more than once")]
pub struct DuplicateMember(pub MemberKey);

impl MembershipSet {
    pub fn new() -> Self {
        Self::default()
    }
    /// Returns false when the key was already present.
    pub fn insert(&mut self, key: impl Into<MemberKey>) -> bool {
        self.0.insert(key.into())
    }
    pub fn remove(&mut self, key: &MemberKey) -> bool {
        self.0.remove(key)
    }
    pub fn contains(&self, key: &MemberKey) -> bool {
        self.0.contains(key)
    }
    pub fn len(&self) -> usize {
        self.0.len()
    }
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
    pub fn iter(&self) -> impl Iterator<Item = &MemberKey> {
        self.0.iter()
    }
    /// Members of `self` that are not in `other`, in key order.
    pub fn difference<'a>(&'a self, other: &'a MembershipSet) -> impl Iterator<Item = &'a MemberKey> {
        self.0.difference(&other.0)
    }
    pub fn intersection<'a>(&'a self, other: &'a MembershipSet) -> impl Iterator<Item = &'a MemberKey> {
        self.0.intersection(&other.0)
    }
    pub fn apply(&mut self, operation: &Operation) {
        match operation {
            Operation::Add(key) => {
                self.0.insert(key.clone());
            }
            Operation::Remove(key) => {
                self.0.remove(key);
            }
        }
    }
}

impl TryFrom<Vec<MemberKey>> for MembershipSet {
    type Error = DuplicateMember;

    fn try_from(keys: Vec<MemberKey>) -> Result<Self, Self::Error> {
        let mut set = MembershipSet::new();
        for key in keys {
            if set.0.contains(&key) {
                return Err(DuplicateMember(key));
            }
            set.0.insert(key);
        }
        Ok(set)
    }
}

impl From<MembershipSet> for Vec<MemberKey> {
    fn from(set: MembershipSet) -> Self {
        set.0.into_iter().collect()
    }
}

impl<K: Into<MemberKey>> FromIterator<K> for MembershipSet {
    fn from_iter<T: IntoIterator<Item = K>>(iter: T) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

impl IntoIterator for MembershipSet {
    type Item = MemberKey;
    type IntoIter = std::collections::btree_set::IntoIter<MemberKey>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a MembershipSet {
    type Item = &'a MemberKey;
    type IntoIter = std::collections::btree_set::Iter<'a, MemberKey>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// One membership change issued against the backend.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(tag = "op", content = "member", rename_all = "snake_case")]
pub enum Operation {
    Add(MemberKey),
    Remove(MemberKey),
}

impl Operation {
    pub fn member(&self) -> &MemberKey {
        match self {
            Operation::Add(key) | Operation::Remove(key) => key,
        }
    }
    pub fn is_add(&self) -> bool {
        matches!(self, Operation::Add(_))
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Add(key) => write!(f, "add {key}"),
            Operation::Remove(key) => write!(f, "remove {key}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserializing_duplicate_keys_is_rejected() {
        let err = serde_json::from_str::<MembershipSet>(r#"["bob","alice","bob"]"#).unwrap_err();
        assert!(err.to_string().contains("`bob` appears more than once"));
    }

    #[test]
    fn serializes_as_sorted_array() {
        let set: MembershipSet = ["carol", "alice"].into_iter().collect();
        assert_eq!(serde_json::to_string(&set).unwrap(), r#"["alice","carol"]"#);
    }

    #[test]
    fn insertion_order_is_not_significant() {
        let a: MembershipSet = ["x", "y", "z"].into_iter().collect();
        let b: MembershipSet = ["z", "x", "y"].into_iter().collect();
        assert_eq!(a, b);
    }

    #[test]
    fn apply_add_and_remove() {
        let mut set: MembershipSet = ["bob"].into_iter().collect();
        set.apply(&Operation::Add("alice".into()));
        set.apply(&Operation::Remove("bob".into()));
        set.apply(&Operation::Remove("nobody".into()));
        assert_eq!(set, ["alice"].into_iter().collect());
    }

    #[test]
    fn operation_wire_shape() {
        let op = Operation::Remove("dave".into());
        assert_eq!(
            serde_json::to_value(&op).unwrap(),
            serde_json::json!({"op": "remove", "member": "dave"})
        );
    }
}
