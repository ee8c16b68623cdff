use crate::rect::{GeoPoint, GeoRect};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Relative precision under which a variance or a covariance is treated as zero when splitting
const DISCRIMINATION_PRECISION: f64 = 1e-6;

/// Anything that can be placed on a map and clustered.
pub trait Annotation {
    /// Position of the annotation
    fn coordinate(&self) -> GeoPoint;

    /// Display title of the annotation
    fn title(&self) -> &str;
}

impl<T: Annotation + ?Sized> Annotation for &T {
    fn coordinate(&self) -> GeoPoint {
        (**self).coordinate()
    }

    fn title(&self) -> &str {
        (**self).title()
    }
}

/// Index of a node inside the [`ClusterTree`] that produced it.
///
/// Nodes are numbered in pre-order: the root is `0`, a cluster's left child directly follows it,
/// and a subtree always occupies a contiguous range of ids.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(usize);

impl NodeId {
    /// Position of the node in the tree's arena
    pub fn index(self) -> usize {
        self.0
    }
}

/// What a node holds.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NodeKind {
    /// The root of a tree built from no annotations
    Empty,

    /// A single original annotation, addressed by its index in the input list
    Leaf { annotation: usize },

    /// Two or more annotations split in two halves
    Cluster { left: NodeId, right: NodeId },
}

/// A node of the cluster hierarchy.
#[derive(Clone, Debug, PartialEq)]
pub struct ClusterNode {
    id: NodeId,
    depth: usize,
    bounds: GeoRect,
    coordinate: Option<GeoPoint>,
    member_count: usize,
    kind: NodeKind,
}

impl ClusterNode {
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Distance from the root, which has depth `0`.
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Rectangle enclosing every annotation of the subtree.
    ///
    /// Leaves carry a zero-area rectangle at their own position, the root carries the whole earth.
    pub fn bounds(&self) -> &GeoRect {
        &self.bounds
    }

    /// The position a marker for this node should be drawn at.
    ///
    /// For a leaf this is the annotation's coordinate, for a cluster the mean position of its
    /// members computed when it was split. The empty root has no coordinate.
    pub fn coordinate(&self) -> Option<GeoPoint> {
        self.coordinate
    }

    /// Number of original annotations under this node.
    pub fn member_count(&self) -> usize {
        self.member_count
    }

    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self.kind, NodeKind::Leaf { .. })
    }

    pub fn is_cluster(&self) -> bool {
        matches!(self.kind, NodeKind::Cluster { .. })
    }

    /// Number of arena slots taken by the subtree rooted here, this node included.
    fn subtree_len(&self) -> usize {
        (2 * self.member_count).saturating_sub(1).max(1)
    }
}

/// A set of annotations waiting to become a node.
struct Pending {
    members: Vec<usize>,
    depth: usize,
    bounds: GeoRect,
}

/// The outcome of splitting a set of annotations in two.
struct Split {
    left: Vec<usize>,
    right: Vec<usize>,
    center: GeoPoint,
}

/// An immutable binary hierarchy of annotations.
///
/// The tree is built once from a snapshot of annotations and never modified afterwards, so it can
/// be shared between threads and queried concurrently. A changed input set means building a new tree.
#[derive(Clone, Debug)]
pub struct ClusterTree<A> {
    /// Input annotations, in the order they were given
    annotations: Vec<A>,

    /// Nodes in pre-order
    nodes: Vec<ClusterNode>,

    /// Depth of the deepest node
    height: usize,
}

impl<A: Annotation> ClusterTree<A> {
    /// Build the cluster hierarchy of a set of annotations.
    ///
    /// Every set of two or more annotations is split along its principal axis, the direction in
    /// which the coordinates spread the most, until each leaf wraps a single annotation. Sets whose
    /// coordinates barely vary along latitude or longitude are split in two halves in input order.
    ///
    /// # Arguments
    ///
    /// - `annotations`: The annotations to cluster. An empty list yields a tree made of a single empty root.
    ///
    /// # Returns
    ///
    /// The root of the hierarchy covers the whole earth.
    pub fn build(annotations: Vec<A>) -> Self {
        let capacity = (2 * annotations.len()).saturating_sub(1).max(1);
        let mut nodes: Vec<ClusterNode> = Vec::with_capacity(capacity);
        let mut height = 0;

        let mut stack = vec![Pending {
            members: (0..annotations.len()).collect(),
            depth: 0,
            bounds: GeoRect::WORLD,
        }];

        // Left children are popped first so that ids follow pre-order
        while let Some(pending) = stack.pop() {
            let id = NodeId(nodes.len());
            height = height.max(pending.depth);

            match pending.members.len() {
                0 => nodes.push(ClusterNode {
                    id,
                    depth: pending.depth,
                    bounds: pending.bounds,
                    coordinate: None,
                    member_count: 0,
                    kind: NodeKind::Empty,
                }),
                1 => {
                    let annotation = pending.members[0];

                    nodes.push(ClusterNode {
                        id,
                        depth: pending.depth,
                        bounds: pending.bounds,
                        coordinate: Some(annotations[annotation].coordinate()),
                        member_count: 1,
                        kind: NodeKind::Leaf { annotation },
                    });
                }
                member_count => {
                    let split = split(&annotations, pending.members);
                    let left = NodeId(id.0 + 1);
                    let right = NodeId(id.0 + 2 * split.left.len());

                    nodes.push(ClusterNode {
                        id,
                        depth: pending.depth,
                        bounds: pending.bounds,
                        coordinate: Some(split.center),
                        member_count,
                        kind: NodeKind::Cluster { left, right },
                    });

                    let right_bounds = bounds_of(&annotations, &split.right);
                    let left_bounds = bounds_of(&annotations, &split.left);

                    stack.push(Pending {
                        members: split.right,
                        depth: pending.depth + 1,
                        bounds: right_bounds.unwrap_or(pending.bounds),
                    });
                    stack.push(Pending {
                        members: split.left,
                        depth: pending.depth + 1,
                        bounds: left_bounds.unwrap_or(pending.bounds),
                    });
                }
            }
        }

        debug!(
            annotations = annotations.len(),
            nodes = nodes.len(),
            height,
            "built cluster tree"
        );

        ClusterTree {
            annotations,
            nodes,
            height,
        }
    }

    /// Iterate over the original annotations under a node, left to right.
    ///
    /// # Panics
    ///
    /// Panics if `id` was not produced by this tree.
    pub fn leaf_annotations(&self, id: NodeId) -> impl Iterator<Item = &A> + '_ {
        self.subtree(id).iter().filter_map(|node| match node.kind {
            NodeKind::Leaf { annotation } => Some(&self.annotations[annotation]),
            _ => None,
        })
    }

    /// Collect the original annotations under a node.
    ///
    /// # Arguments
    ///
    /// - `id`: The node whose subtree is collected.
    ///
    /// # Returns
    ///
    /// The annotation itself for a leaf, otherwise the annotations of the left subtree followed by
    /// those of the right subtree. Empty for the empty root.
    pub fn original_annotations(&self, id: NodeId) -> Vec<&A> {
        self.leaf_annotations(id).collect()
    }
}

impl<A> ClusterTree<A> {
    pub fn root(&self) -> &ClusterNode {
        &self.nodes[0]
    }

    /// Look up a node.
    ///
    /// # Panics
    ///
    /// Panics if `id` was not produced by this tree.
    pub fn node(&self, id: NodeId) -> &ClusterNode {
        &self.nodes[id.0]
    }

    /// Look up a node, returning `None` if `id` is out of range.
    pub fn get(&self, id: NodeId) -> Option<&ClusterNode> {
        self.nodes.get(id.0)
    }

    /// The two children of a cluster, left first.
    ///
    /// # Panics
    ///
    /// Panics if `id` was not produced by this tree.
    pub fn children(&self, id: NodeId) -> Option<(NodeId, NodeId)> {
        match self.nodes[id.0].kind {
            NodeKind::Cluster { left, right } => Some((left, right)),
            _ => None,
        }
    }

    /// The annotation wrapped by a leaf.
    ///
    /// # Panics
    ///
    /// Panics if `id` was not produced by this tree.
    pub fn annotation(&self, id: NodeId) -> Option<&A> {
        match self.nodes[id.0].kind {
            NodeKind::Leaf { annotation } => Some(&self.annotations[annotation]),
            _ => None,
        }
    }

    /// Number of original annotations under a node.
    ///
    /// # Panics
    ///
    /// Panics if `id` was not produced by this tree.
    pub fn member_count(&self, id: NodeId) -> usize {
        self.nodes[id.0].member_count
    }

    /// Check whether a node is a strict ancestor of another one.
    ///
    /// Runs in constant time: the subtree of a node is a contiguous range of ids starting at the node.
    ///
    /// # Arguments
    ///
    /// - `ancestor`: The candidate ancestor.
    /// - `descendant`: The candidate descendant.
    ///
    /// # Returns
    ///
    /// `true` if `descendant` is a child of `ancestor` or a descendant of one of its children.
    ///
    /// # Panics
    ///
    /// Panics if either id was not produced by this tree.
    pub fn is_ancestor_of(&self, ancestor: NodeId, descendant: NodeId) -> bool {
        let node = &self.nodes[ancestor.0];
        let other = &self.nodes[descendant.0];

        node.depth < other.depth
            && ancestor.0 < descendant.0
            && descendant.0 < ancestor.0 + node.subtree_len()
    }

    /// Check whether `node` is `other` or one of its ancestors, i.e. whether a marker shown for
    /// `node` already accounts for the annotations of `other`.
    pub fn covers(&self, node: NodeId, other: NodeId) -> bool {
        node == other || self.is_ancestor_of(node, other)
    }

    /// Input annotations, in the order they were given.
    pub fn annotations(&self) -> &[A] {
        &self.annotations
    }

    /// Every node, in pre-order.
    pub fn nodes(&self) -> &[ClusterNode] {
        &self.nodes
    }

    /// Number of annotations in the tree.
    pub fn len(&self) -> usize {
        self.annotations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.annotations.is_empty()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Depth of the deepest node.
    pub fn height(&self) -> usize {
        self.height
    }

    fn subtree(&self, id: NodeId) -> &[ClusterNode] {
        let len = self.nodes[id.0].subtree_len();

        &self.nodes[id.0..id.0 + len]
    }
}

/// Split a set of two or more annotations along its principal axis.
///
/// # Arguments
///
/// - `annotations`: All the input annotations.
/// - `members`: Indices of the annotations to split.
///
/// # Returns
///
/// Two non-empty halves and the mean position of the set.
fn split<A: Annotation>(annotations: &[A], members: Vec<usize>) -> Split {
    let n = members.len() as f64;

    // Latitude is y, longitude is x
    let (x_sum, y_sum) = members.iter().fold((0.0, 0.0), |(x, y), &i| {
        let coordinate = annotations[i].coordinate();

        (x + coordinate.longitude, y + coordinate.latitude)
    });
    let x_mean = x_sum / n;
    let y_mean = y_sum / n;

    let mut sxx = 0.0;
    let mut syy = 0.0;
    let mut sxy = 0.0;

    for &i in &members {
        let coordinate = annotations[i].coordinate();
        let x = coordinate.longitude - x_mean;
        let y = coordinate.latitude - y_mean;

        sxx += x * x;
        syy += y * y;
        sxy += x * y;
    }

    let center = GeoPoint::new(y_mean, x_mean);

    // All coordinates equal along one axis: the projection is meaningless
    if sxx.abs() / n <= DISCRIMINATION_PRECISION || syy.abs() / n <= DISCRIMINATION_PRECISION {
        return split_in_half(members, center);
    }

    let (ax, ay) = if sxy.abs() / n <= DISCRIMINATION_PRECISION {
        if sxx > syy {
            (1.0, 0.0)
        } else {
            (0.0, 1.0)
        }
    } else {
        // Dominant eigenvector of the covariance matrix
        let trace = sxx + syy;
        let lambda = 0.5 * (trace + (trace * trace + 4.0 * sxy * sxy).sqrt());

        (sxy, lambda - sxx)
    };

    let (left, right): (Vec<usize>, Vec<usize>) = members.into_iter().partition(|&i| {
        let coordinate = annotations[i].coordinate();

        (coordinate.longitude - x_mean) * ax + (coordinate.latitude - y_mean) * ay > 0.0
    });

    // Only reachable with non-finite coordinates
    if left.is_empty() {
        return split_in_half(right, center);
    }
    if right.is_empty() {
        return split_in_half(left, center);
    }

    Split {
        left,
        right,
        center,
    }
}

/// Split a set in two halves in input order, the right half taking the extra member.
fn split_in_half(mut members: Vec<usize>, center: GeoPoint) -> Split {
    let right = members.split_off(members.len() / 2);

    Split {
        left: members,
        right,
        center,
    }
}

fn bounds_of<A: Annotation>(annotations: &[A], members: &[usize]) -> Option<GeoRect> {
    GeoRect::bounding(members.iter().map(|&i| annotations[i].coordinate()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, Debug, PartialEq)]
    struct Pin {
        coordinate: GeoPoint,
        title: String,
    }

    impl Annotation for Pin {
        fn coordinate(&self) -> GeoPoint {
            self.coordinate
        }

        fn title(&self) -> &str {
            &self.title
        }
    }

    fn pins(coordinates: &[(f64, f64)]) -> Vec<Pin> {
        coordinates
            .iter()
            .enumerate()
            .map(|(i, &(latitude, longitude))| Pin {
                coordinate: GeoPoint::new(latitude, longitude),
                title: format!("pin {}", i),
            })
            .collect()
    }

    fn members(tree: &ClusterTree<Pin>, id: NodeId) -> Vec<&str> {
        tree.leaf_annotations(id)
            .map(|pin| pin.title.as_str())
            .collect()
    }

    #[test]
    fn test_build_empty() {
        let tree = ClusterTree::<Pin>::build(vec![]);
        let root = tree.root();

        assert!(tree.is_empty());
        assert_eq!(tree.node_count(), 1);
        assert_eq!(root.kind(), NodeKind::Empty);
        assert_eq!(root.coordinate(), None);
        assert_eq!(root.member_count(), 0);
        assert_eq!(root.bounds(), &GeoRect::WORLD);
        assert!(tree.original_annotations(root.id()).is_empty());
    }

    #[test]
    fn test_build_single() {
        let tree = ClusterTree::build(pins(&[(48.85, 2.35)]));
        let root = tree.root();

        assert!(root.is_leaf());
        assert_eq!(root.depth(), 0);
        assert_eq!(root.coordinate(), Some(GeoPoint::new(48.85, 2.35)));
        assert_eq!(tree.annotation(root.id()).unwrap().title, "pin 0");
        assert_eq!(tree.member_count(root.id()), 1);
    }

    #[test]
    fn test_build_square() {
        let tree = ClusterTree::build(pins(&[(0.0, 0.0), (0.0, 1.0), (1.0, 0.0), (1.0, 1.0)]));
        let root = tree.root();

        assert_eq!(tree.node_count(), 7);
        assert_eq!(tree.height(), 2);
        assert_eq!(root.member_count(), 4);
        assert_eq!(root.coordinate(), Some(GeoPoint::new(0.5, 0.5)));

        // No covariance and equal spread: the split is made on latitude, northern points go left
        let (left, right) = tree.children(root.id()).unwrap();

        assert_eq!(members(&tree, left), vec!["pin 2", "pin 3"]);
        assert_eq!(members(&tree, right), vec!["pin 0", "pin 1"]);
        assert_eq!(
            tree.node(left).bounds(),
            &GeoRect::new(GeoPoint::new(1.0, 0.0), GeoPoint::new(1.0, 1.0))
        );
        assert_eq!(tree.node(left).coordinate(), Some(GeoPoint::new(1.0, 0.5)));
    }

    #[test]
    fn test_split_along_diagonal() {
        let tree = ClusterTree::build(pins(&[
            (0.0, 0.0),
            (10.0, 10.0),
            (1.0, 1.5),
            (11.0, 10.5),
        ]));
        let (left, right) = tree.children(tree.root().id()).unwrap();

        // Each pair is split again along its own diagonal, north-eastern pin first
        assert_eq!(members(&tree, left), vec!["pin 3", "pin 1"]);
        assert_eq!(members(&tree, right), vec!["pin 2", "pin 0"]);
        assert_eq!(
            members(&tree, tree.root().id()),
            vec!["pin 3", "pin 1", "pin 2", "pin 0"]
        );
    }

    #[test]
    fn test_split_along_longitude() {
        let tree = ClusterTree::build(pins(&[
            (0.0, -20.0),
            (0.5, 20.0),
            (-0.5, -21.0),
            (0.0, 21.0),
        ]));
        let (left, right) = tree.children(tree.root().id()).unwrap();

        assert_eq!(members(&tree, left), vec!["pin 1", "pin 3"]);
        assert_eq!(members(&tree, right), vec!["pin 0", "pin 2"]);
    }

    #[test]
    fn test_uncorrelated_wide_spread_splits_on_longitude() {
        // No covariance and a larger spread in longitude: eastern points go left
        let tree = ClusterTree::build(pins(&[
            (1.0, -10.0),
            (-1.0, -10.0),
            (1.0, 10.0),
            (-1.0, 10.0),
        ]));
        let (left, right) = tree.children(tree.root().id()).unwrap();

        assert_eq!(members(&tree, left), vec!["pin 2", "pin 3"]);
        assert_eq!(members(&tree, right), vec!["pin 0", "pin 1"]);
        assert_eq!(
            tree.node(left).bounds(),
            &GeoRect::new(GeoPoint::new(-1.0, 10.0), GeoPoint::new(1.0, 10.0))
        );
    }

    #[test]
    fn test_variance_at_precision_splits_in_half() {
        // Longitude variance is exactly 1e-6: the pair is split in input order
        let tree = ClusterTree::build(pins(&[(0.0, -0.001), (10.0, 0.001)]));
        let (left, right) = tree.children(tree.root().id()).unwrap();

        assert_eq!(members(&tree, left), vec!["pin 0"]);
        assert_eq!(members(&tree, right), vec!["pin 1"]);
    }

    #[test]
    fn test_variance_above_precision_splits_on_axis() {
        let tree = ClusterTree::build(pins(&[(0.0, -0.0011), (10.0, 0.0011)]));
        let (left, right) = tree.children(tree.root().id()).unwrap();

        assert_eq!(members(&tree, left), vec!["pin 1"]);
        assert_eq!(members(&tree, right), vec!["pin 0"]);
    }

    #[test]
    fn test_coincident_points_split_in_half() {
        let tree = ClusterTree::build(pins(&[(3.0, 3.0); 5]));
        let root = tree.root();
        let (left, right) = tree.children(root.id()).unwrap();

        assert_eq!(root.member_count(), 5);
        assert_eq!(root.coordinate(), Some(GeoPoint::new(3.0, 3.0)));
        assert_eq!(members(&tree, left), vec!["pin 0", "pin 1"]);
        assert_eq!(members(&tree, right), vec!["pin 2", "pin 3", "pin 4"]);
        assert_eq!(tree.node_count(), 9);
    }

    #[test]
    fn test_same_latitude_splits_in_input_order() {
        let tree = ClusterTree::build(pins(&[
            (5.0, 30.0),
            (5.0, -30.0),
            (5.0, 31.0),
            (5.0, -31.0),
        ]));
        let (left, right) = tree.children(tree.root().id()).unwrap();

        assert_eq!(members(&tree, left), vec!["pin 0", "pin 1"]);
        assert_eq!(members(&tree, right), vec!["pin 2", "pin 3"]);
    }

    #[test]
    fn test_non_finite_coordinates_terminate() {
        let tree = ClusterTree::build(pins(&[(f64::NAN, 0.0), (1.0, f64::NAN), (2.0, 2.0)]));

        assert_eq!(tree.root().member_count(), 3);
        assert_eq!(tree.original_annotations(tree.root().id()).len(), 3);
    }

    #[test]
    fn test_unbalanced_input_does_not_overflow() {
        let coordinates: Vec<(f64, f64)> = (0..2000)
            .map(|i| (0.0, -180.0 + 360.0 * (1.0 - 0.99_f64.powi(i))))
            .map(|(lat, lon)| (lat + lon / 1000.0, lon))
            .collect();
        let tree = ClusterTree::build(pins(&coordinates));

        assert_eq!(tree.root().member_count(), 2000);
        assert_eq!(tree.node_count(), 3999);
    }

    #[test]
    fn test_depth_and_ids() {
        let tree = ClusterTree::build(pins(&[
            (10.0, 10.0),
            (-20.0, 40.0),
            (35.0, -60.0),
            (0.0, 0.0),
            (60.0, 100.0),
            (-45.0, -120.0),
        ]));

        for (index, node) in tree.nodes().iter().enumerate() {
            assert_eq!(node.id().index(), index);

            if let Some((left, right)) = tree.children(node.id()) {
                assert_eq!(left.index(), index + 1);
                assert_eq!(tree.node(left).depth(), node.depth() + 1);
                assert_eq!(tree.node(right).depth(), node.depth() + 1);
                assert_eq!(
                    tree.member_count(left) + tree.member_count(right),
                    node.member_count()
                );
            }
        }
    }

    #[test]
    fn test_bounds_enclose_members() {
        let tree = ClusterTree::build(pins(&[
            (10.0, 10.0),
            (-20.0, 40.0),
            (35.0, -60.0),
            (0.0, 0.0),
            (60.0, 100.0),
        ]));

        for node in tree.nodes() {
            for pin in tree.leaf_annotations(node.id()) {
                assert!(node.bounds().contains(&pin.coordinate));
            }
        }
    }

    #[test]
    fn test_ancestry() {
        let tree = ClusterTree::build(pins(&[(0.0, 0.0), (0.0, 1.0), (1.0, 0.0), (1.0, 1.0)]));
        let root = tree.root().id();
        let (left, right) = tree.children(root).unwrap();
        let (left_leaf, _) = tree.children(left).unwrap();
        let (_, right_leaf) = tree.children(right).unwrap();

        assert!(tree.is_ancestor_of(root, left));
        assert!(tree.is_ancestor_of(root, right_leaf));
        assert!(tree.is_ancestor_of(left, left_leaf));
        assert!(!tree.is_ancestor_of(left, right_leaf));
        assert!(!tree.is_ancestor_of(right, left_leaf));
        assert!(!tree.is_ancestor_of(left, root));
        assert!(!tree.is_ancestor_of(left, left));

        assert!(tree.covers(left, left));
        assert!(tree.covers(root, left_leaf));
        assert!(!tree.covers(left_leaf, left));
    }

    #[test]
    fn test_get_foreign_id() {
        let tree = ClusterTree::build(pins(&[(1.0, 1.0), (2.0, 2.0)]));
        let foreign = NodeId(5);

        assert!(tree.get(foreign).is_none());
        assert!(tree.get(tree.root().id()).is_some());
    }

    #[test]
    #[should_panic]
    fn test_member_count_of_foreign_id() {
        let tree = ClusterTree::build(pins(&[(1.0, 1.0), (2.0, 2.0)]));

        tree.member_count(NodeId(5));
    }

    #[test]
    fn test_build_from_references() {
        let owned = pins(&[(1.0, 1.0), (2.0, 2.0)]);
        let tree = ClusterTree::build(owned.iter().collect::<Vec<&Pin>>());

        assert_eq!(tree.len(), 2);
        assert_eq!(tree.original_annotations(tree.root().id()).len(), 2);
    }
}
