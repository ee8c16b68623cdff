#![forbid(unsafe_code)]
//! Hierarchical clustering of map annotations for level-of-detail marker display.
//!
//! A [`ClusterTree`] recursively splits a set of annotations along their principal axis until
//! every leaf holds a single annotation. For each viewport change, [`ClusterTree::query`] walks the
//! hierarchy breadth-first and returns at most a given number of nodes, clusters or single
//! annotations, summarizing what is visible.
//!
//! [`Clusterer`] bundles a tree with its display options and publishes rebuilt trees atomically.
//!
//! ```
//! use mapcluster::{Clusterer, GeoPoint, GeoRect, Options, Place};
//!
//! let mut clusterer = Clusterer::new(Options::default()).unwrap();
//!
//! clusterer.load(vec![
//!     Place::new("Lisbon", GeoPoint::new(38.72, -9.14)),
//!     Place::new("Porto", GeoPoint::new(41.15, -8.61)),
//! ]);
//!
//! let markers = clusterer.get_clusters(&GeoRect::WORLD);
//!
//! assert_eq!(markers.len(), 2);
//! ```

mod feature;
mod query;
mod rect;
mod tree;

use geojson::FeatureCollection;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

pub use feature::{
    abbreviate_count, format_count, places_from_geojson, to_feature, to_feature_collection,
    Marker, Place, Properties,
};
pub use rect::{GeoPoint, GeoRect};
pub use tree::{Annotation, ClusterNode, ClusterTree, NodeId, NodeKind};

/// Default number of markers shown at once
const DEFAULT_MAX_CLUSTERS: usize = 13;

/// Placeholder receiving the member count in cluster titles
const COUNT_PLACEHOLDER: &str = "{}";

/// Errors raised while configuring a clusterer or importing and exporting features
#[derive(Debug, thiserror::Error)]
pub enum ClusterError {
    #[error("Invalid options: {0}")]
    InvalidOptions(String),

    #[error("GeoJSON error: {0}")]
    GeoJson(#[from] geojson::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Feature {index} has no geometry")]
    MissingGeometry { index: usize },

    #[error("Feature {index} has a {kind} geometry, expected a Point")]
    UnsupportedGeometry { index: usize, kind: &'static str },

    #[error("Feature {index} has a position with fewer than two coordinates")]
    InvalidPosition { index: usize },
}

pub type Result<T> = std::result::Result<T, ClusterError>;

/// Clusterer configuration options
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Options {
    /// Maximum number of markers returned for a viewport
    pub max_clusters: usize,

    /// Title of cluster markers, `{}` is replaced with the number of annotations in the cluster
    pub title_format: String,
}

impl Default for Options {
    fn default() -> Self {
        Options {
            max_clusters: DEFAULT_MAX_CLUSTERS,
            title_format: COUNT_PLACEHOLDER.to_string(),
        }
    }
}

impl Options {
    /// Parse options from JSON, missing fields taking their default value.
    ///
    /// # Arguments
    ///
    /// - `json`: A JSON object such as `{"max_clusters": 20, "title_format": "{} stations"}`.
    ///
    /// # Returns
    ///
    /// The validated options, or an error if the JSON is malformed or the options are invalid.
    pub fn from_json(json: &str) -> Result<Self> {
        let options: Options = serde_json::from_str(json)?;

        options.validate()?;

        Ok(options)
    }

    /// Check that at least one marker can be shown and that cluster titles carry their count.
    pub fn validate(&self) -> Result<()> {
        if self.max_clusters == 0 {
            return Err(ClusterError::InvalidOptions(
                "max_clusters must be at least 1".to_string(),
            ));
        }

        if !self.title_format.contains(COUNT_PLACEHOLDER) {
            return Err(ClusterError::InvalidOptions(format!(
                "title_format {:?} has no {} placeholder",
                self.title_format, COUNT_PLACEHOLDER
            )));
        }

        Ok(())
    }
}

/// A cluster tree together with the options used to display it.
///
/// The current tree is published behind an [`Arc`]. [`Clusterer::load`] builds a complete new
/// tree before replacing it, so readers holding the previous tree keep a consistent view.
#[derive(Clone, Debug)]
pub struct Clusterer<A> {
    /// Configuration settings
    options: Options,

    /// The currently published tree
    tree: Arc<ClusterTree<A>>,
}

impl<A: Annotation> Clusterer<A> {
    /// Create a new clusterer with no annotations.
    ///
    /// # Arguments
    ///
    /// - `options`: The configuration options.
    ///
    /// # Returns
    ///
    /// The clusterer, or an error if the options are invalid.
    pub fn new(options: Options) -> Result<Self> {
        options.validate()?;

        Ok(Clusterer {
            options,
            tree: Arc::new(ClusterTree::build(Vec::new())),
        })
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    /// Replace the clustered annotations, rebuilding the whole hierarchy.
    ///
    /// # Arguments
    ///
    /// - `annotations`: The new set of annotations.
    ///
    /// # Returns
    ///
    /// A mutable reference to the updated `Clusterer` instance.
    pub fn load(&mut self, annotations: Vec<A>) -> &mut Self {
        let tree = ClusterTree::build(annotations);

        debug!(
            annotations = tree.len(),
            height = tree.height(),
            "published cluster tree"
        );

        self.tree = Arc::new(tree);

        self
    }

    /// The currently published tree, which stays valid and unchanged after later loads.
    pub fn tree(&self) -> Arc<ClusterTree<A>> {
        Arc::clone(&self.tree)
    }

    /// Retrieve the markers to display in a viewport.
    ///
    /// # Arguments
    ///
    /// - `view`: The visible rectangle.
    ///
    /// # Returns
    ///
    /// At most `max_clusters` markers, single annotations first, then clusters.
    pub fn get_clusters(&self, view: &GeoRect) -> Vec<Marker> {
        self.tree
            .query(self.options.max_clusters, view)
            .into_iter()
            .filter_map(|id| self.tree.marker(id, &self.options.title_format))
            .collect()
    }

    /// Retrieve the markers to display in a viewport as a GeoJSON `FeatureCollection`.
    pub fn get_features(&self, view: &GeoRect) -> Result<FeatureCollection> {
        let ids = self.tree.query(self.options.max_clusters, view);

        to_feature_collection(&*self.tree, &ids, &self.options.title_format)
    }

    /// Title of a node of the published tree.
    pub fn title(&self, id: NodeId) -> String {
        self.tree.title(id, &self.options.title_format)
    }
}
