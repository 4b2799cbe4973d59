use crate::tree::{NodeId, Tree};

/// Replaces every relevance with its simplified form.
pub fn enforce_relevance(mut tree: Tree) -> Tree {
    let universe = tree.strata();
    let ids = tree.preorder().collect::<Vec<NodeId>>();
    for id in ids {
        let node = tree.node_mut(id);
        node.relevance = node.relevance.simplify(&universe);
    }
    tree
}
