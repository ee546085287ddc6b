use proptest::prelude::*;

/// Number of nodes and a list of candidate edges between them
pub fn edge_candidates_strategy() -> impl Strategy<Value = (usize, Vec<(usize, usize)>)> {
    (2usize..8).prop_flat_map(|nodes| {
        let edge = (0..nodes, 0..nodes);
        (Just(nodes), prop::collection::vec(edge, 0..24))
    })
}

/// Length of a split sequence, including empty ones
pub fn split_len_strategy() -> impl Strategy<Value = usize> {
    0usize..6
}
