use crate::rect::GeoRect;
use crate::tree::{Annotation, ClusterTree, NodeId};
use tracing::{debug, trace};

impl<A: Annotation> ClusterTree<A> {
    /// Select the nodes to display for a viewport.
    ///
    /// The tree is walked breadth-first, one level at a time, so that the returned clusters come
    /// from the same depth wherever possible. Leaves met on the way are kept as they are, clusters
    /// are only descended into when their bounds intersect `view`. The walk stops once the budget
    /// is reached or nothing deeper intersects the viewport, going back one level if the last step
    /// overshot `max_results`.
    ///
    /// # Arguments
    ///
    /// - `max_results`: The maximum number of nodes to return. `0` returns nothing.
    /// - `view`: The visible rectangle, which may cross the antimeridian.
    ///
    /// # Returns
    ///
    /// At most `max_results` nodes: the collected leaves first, then the clusters. A node is only
    /// returned if `view` contains its coordinate or the coordinate of one of its annotations.
    pub fn query(&self, max_results: usize, view: &GeoRect) -> Vec<NodeId> {
        if max_results == 0 {
            return Vec::new();
        }

        let mut clusters = vec![self.root().id()];
        let mut leaves: Vec<NodeId> = Vec::new();
        let mut previous: Option<(Vec<NodeId>, Vec<NodeId>)> = None;
        let mut changed = true;

        while clusters.len() + leaves.len() < max_results && !clusters.is_empty() && changed {
            previous = Some((clusters.clone(), leaves.clone()));
            changed = false;

            let mut next_level = Vec::new();

            for &cluster in &clusters {
                let Some((left, right)) = self.children(cluster) else {
                    continue;
                };

                for child in [left, right] {
                    let node = self.node(child);

                    if node.is_leaf() {
                        leaves.push(child);
                    } else if view.intersects(node.bounds()) {
                        next_level.push(child);
                    }
                }
            }

            trace!(
                clusters = next_level.len(),
                leaves = leaves.len(),
                "expanded cluster level"
            );

            if !next_level.is_empty() {
                clusters = next_level;
                changed = true;
            }
        }

        self.remove_ancestors(&mut clusters, &leaves);

        let mut rolled_back = false;

        if clusters.len() + leaves.len() > max_results {
            // The last level went over budget
            if let Some((previous_clusters, previous_leaves)) = previous {
                clusters = previous_clusters;
                leaves = previous_leaves;
                rolled_back = true;

                self.remove_ancestors(&mut clusters, &leaves);
            }
        }

        let mut result = leaves;
        result.extend(clusters);
        result.retain(|&id| self.is_visible(id, view));

        debug!(
            max_results,
            results = result.len(),
            rolled_back,
            %view,
            "queried cluster tree"
        );

        result
    }

    /// Drop every cluster that is an ancestor of another selected node.
    fn remove_ancestors(&self, clusters: &mut Vec<NodeId>, leaves: &[NodeId]) {
        let selected: Vec<NodeId> = clusters.iter().chain(leaves).copied().collect();

        clusters.retain(|&cluster| {
            !selected
                .iter()
                .any(|&other| self.is_ancestor_of(cluster, other))
        });
    }

    /// A node is visible if `view` contains its coordinate or one of its annotations.
    fn is_visible(&self, id: NodeId, view: &GeoRect) -> bool {
        let centered = self
            .node(id)
            .coordinate()
            .is_some_and(|coordinate| view.contains(&coordinate));

        centered
            || self
                .leaf_annotations(id)
                .any(|annotation| view.contains(&annotation.coordinate()))
    }
}
