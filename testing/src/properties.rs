//! proptest strategies for read-model inputs.

use crate::fixtures::timestamp;
use proptest::prelude::*;
use std::collections::BTreeSet;

/// Short lowercase identifier usable as a username or entity id.
pub fn identifier() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9]{0,11}"
}

/// Wire timestamp within roughly a year of the fixture origin.
pub fn wire_timestamp() -> impl Strategy<Value = String> {
    (0_i64..31_536_000).prop_map(timestamp)
}

/// Distinct users that like a post, and how many of them unlike it again
/// (never more than liked it).
pub fn likes_then_unlikes(max_users: usize) -> impl Strategy<Value = (Vec<String>, usize)> {
    prop::collection::btree_set(identifier(), 1..=max_users.max(1)).prop_flat_map(
        |users: BTreeSet<String>| {
            let liked = users.len();
            (Just(users.into_iter().collect::<Vec<_>>()), 0..=liked)
        },
    )
}

/// Page size accepted by the read API.
pub fn page_limit() -> impl Strategy<Value = usize> {
    1_usize..=25
}
