//! Set-algebra properties of the membership diff.

use proptest::prelude::*;
use stride_client::reconcile;
use stride_common::{MemberKey, MembershipSet};

fn membership_set() -> impl Strategy<Value = MembershipSet> {
    // A small alphabet with mixed case so overlaps and near-misses are common.
    prop::collection::btree_set("[a-cA-C]{1,2}", 0..12)
        .prop_map(|keys| keys.into_iter().map(MemberKey::from).collect())
}

proptest! {
    #[test]
    fn adds_and_removes_are_disjoint(desired in membership_set(), actual in membership_set()) {
        let diff = reconcile(&desired, &actual);
        for key in &diff.to_add {
            prop_assert!(!diff.to_remove.contains(key));
        }
    }

    #[test]
    fn every_member_is_accounted_for_exactly_once(desired in membership_set(), actual in membership_set()) {
        let diff = reconcile(&desired, &actual);
        let kept: Vec<&MemberKey> = desired.intersection(&actual).collect();
        for key in desired.iter().chain(actual.iter()) {
            let hits = usize::from(diff.to_add.contains(key))
                + usize::from(diff.to_remove.contains(key))
                + usize::from(kept.contains(&key));
            prop_assert_eq!(hits, 1, "member {} counted {} times", key, hits);
        }
        prop_assert_eq!(diff.len() + kept.len(), desired.iter().chain(actual.iter()).collect::<std::collections::BTreeSet<_>>().len());
    }

    #[test]
    fn reconciling_a_set_with_itself_is_empty(set in membership_set()) {
        prop_assert!(reconcile(&set, &set).is_empty());
    }

    #[test]
    fn applying_the_diff_reaches_the_desired_set(desired in membership_set(), actual in membership_set()) {
        let mut state = actual.clone();
        for op in reconcile(&desired, &actual).operations() {
            state.apply(&op);
        }
        prop_assert_eq!(state, desired);
    }
}
