use crate::rect::GeoPoint;
use crate::tree::{Annotation, ClusterTree, NodeId, NodeKind};
use crate::{ClusterError, Result};
use geojson::{feature::Id, Feature, FeatureCollection, GeoJson, Geometry, Value};
use serde::{Deserialize, Serialize};

/// A named point of interest, the annotation type read from GeoJSON.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Place {
    /// Position of the place
    pub coordinate: GeoPoint,

    /// Taken from the `name` property, or `title` when there is no name
    pub title: String,
}

impl Place {
    pub fn new(title: impl Into<String>, coordinate: GeoPoint) -> Self {
        Place {
            coordinate,
            title: title.into(),
        }
    }

    /// Read a place from a GeoJSON `Feature<Point>`.
    ///
    /// # Arguments
    ///
    /// - `index`: Position of the feature in its collection, reported in errors.
    /// - `feature`: The feature to read.
    ///
    /// # Returns
    ///
    /// The place, or an error if the feature has no geometry or its geometry is not a 2-D point.
    pub fn from_feature(index: usize, feature: &Feature) -> Result<Self> {
        let geometry = feature
            .geometry
            .as_ref()
            .ok_or(ClusterError::MissingGeometry { index })?;

        let position = match &geometry.value {
            Value::Point(position) => position,
            other => {
                return Err(ClusterError::UnsupportedGeometry {
                    index,
                    kind: geometry_kind(other),
                })
            }
        };

        let [longitude, latitude, ..] = position.as_slice() else {
            return Err(ClusterError::InvalidPosition { index });
        };

        let title = feature
            .property("name")
            .or_else(|| feature.property("title"))
            .and_then(|value| value.as_str())
            .unwrap_or_default();

        Ok(Place::new(title, GeoPoint::new(*latitude, *longitude)))
    }
}

impl Annotation for Place {
    fn coordinate(&self) -> GeoPoint {
        self.coordinate
    }

    fn title(&self) -> &str {
        &self.title
    }
}

/// Parse places from GeoJSON text.
///
/// # Arguments
///
/// - `text`: A `FeatureCollection`, a single `Feature` or a bare `Point` geometry.
///
/// # Returns
///
/// One place per feature, in document order.
pub fn places_from_geojson(text: &str) -> Result<Vec<Place>> {
    let geojson: GeoJson = text.parse()?;

    match geojson {
        GeoJson::FeatureCollection(collection) => collection
            .features
            .iter()
            .enumerate()
            .map(|(index, feature)| Place::from_feature(index, feature))
            .collect(),
        GeoJson::Feature(feature) => Ok(vec![Place::from_feature(0, &feature)?]),
        GeoJson::Geometry(geometry) => {
            let feature = Feature {
                bbox: None,
                geometry: Some(geometry),
                id: None,
                properties: None,
                foreign_members: None,
            };

            Ok(vec![Place::from_feature(0, &feature)?])
        }
    }
}

fn geometry_kind(value: &Value) -> &'static str {
    match value {
        Value::Point(_) => "Point",
        Value::MultiPoint(_) => "MultiPoint",
        Value::LineString(_) => "LineString",
        Value::MultiLineString(_) => "MultiLineString",
        Value::Polygon(_) => "Polygon",
        Value::MultiPolygon(_) => "MultiPolygon",
        Value::GeometryCollection(_) => "GeometryCollection",
    }
}

/// Feature metadata attached to exported nodes
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Properties {
    /// Annotation title, or the counted label of a cluster
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Indicates whether the entity is a cluster
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cluster: Option<bool>,

    /// Node id of the cluster
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cluster_id: Option<usize>,

    /// Number of points within a cluster
    #[serde(skip_serializing_if = "Option::is_none")]
    pub point_count: Option<usize>,

    /// An abbreviated point count, useful for display
    #[serde(skip_serializing_if = "Option::is_none")]
    pub point_count_abbreviated: Option<String>,
}

/// A displayable marker produced by a viewport query.
///
/// Markers are plain values detached from the tree, so they stay valid after the tree they came
/// from has been replaced.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Marker {
    /// The node the marker stands for
    pub node: NodeId,

    /// Where to draw the marker
    pub coordinate: GeoPoint,

    /// Number of annotations behind the marker
    pub point_count: usize,

    /// The annotation's title, or the counted label of a cluster
    pub title: String,
}

impl Marker {
    /// Whether the marker stands for several annotations.
    pub fn is_cluster(&self) -> bool {
        self.point_count > 1
    }
}

/// Substitute a count into the first `{}` placeholder of a label format.
///
/// # Examples
///
/// ```
/// assert_eq!(mapcluster::format_count("{} places", 12), "12 places");
/// ```
pub fn format_count(format: &str, count: usize) -> String {
    format.replacen("{}", &count.to_string(), 1)
}

/// Abbreviate a point count for display: `999`, `1.2k`, `15k`.
pub fn abbreviate_count(count: usize) -> String {
    let value = count as f64;

    if count >= 10000 {
        format!("{}k", (value / 1000.0).round())
    } else if count >= 1000 {
        format!("{}k", (value / 100.0).round() / 10.0)
    } else {
        count.to_string()
    }
}

impl<A: Annotation> ClusterTree<A> {
    /// Display title of a node.
    ///
    /// # Arguments
    ///
    /// - `id`: The node to label.
    /// - `format`: The label format of clusters, whose `{}` placeholder receives the member count.
    ///
    /// # Returns
    ///
    /// The annotation's own title for a leaf, the counted label for a cluster, and an empty
    /// string for the empty root.
    pub fn title(&self, id: NodeId, format: &str) -> String {
        match self.node(id).kind() {
            NodeKind::Leaf { .. } => self
                .annotation(id)
                .map(|annotation| annotation.title().to_string())
                .unwrap_or_default(),
            NodeKind::Cluster { .. } => format_count(format, self.member_count(id)),
            NodeKind::Empty => String::new(),
        }
    }

    /// Build the marker of a node, `None` for the empty root.
    pub fn marker(&self, id: NodeId, format: &str) -> Option<Marker> {
        let node = self.node(id);

        Some(Marker {
            node: id,
            coordinate: node.coordinate()?,
            point_count: node.member_count(),
            title: self.title(id, format),
        })
    }

    /// Metadata of a node as exported to GeoJSON.
    pub fn properties(&self, id: NodeId, format: &str) -> Properties {
        let node = self.node(id);
        let name = Some(self.title(id, format));

        if node.is_cluster() {
            Properties {
                name,
                cluster: Some(true),
                cluster_id: Some(id.index()),
                point_count: Some(node.member_count()),
                point_count_abbreviated: Some(abbreviate_count(node.member_count())),
            }
        } else {
            Properties {
                name,
                ..Properties::default()
            }
        }
    }
}

/// Convert a node into a GeoJSON `Feature<Point>`.
///
/// # Arguments
///
/// - `tree`: The tree the node belongs to.
/// - `id`: The node to convert.
/// - `format`: The label format of clusters.
///
/// # Returns
///
/// A feature identified by the node id, with longitude first in its coordinates.
pub fn to_feature<A: Annotation>(
    tree: &ClusterTree<A>,
    id: NodeId,
    format: &str,
) -> Result<Feature> {
    let geometry = tree.node(id).coordinate().map(|coordinate| {
        let position = vec![coordinate.longitude, coordinate.latitude];

        Geometry::new(Value::Point(position))
    });

    let properties = match serde_json::to_value(tree.properties(id, format))? {
        serde_json::Value::Object(map) => Some(map),
        _ => None,
    };

    Ok(Feature {
        bbox: None,
        geometry,
        id: Some(Id::Number(id.index().into())),
        properties,
        foreign_members: None,
    })
}

/// Convert a list of nodes, typically a query result, into a `FeatureCollection`.
pub fn to_feature_collection<A: Annotation>(
    tree: &ClusterTree<A>,
    ids: &[NodeId],
    format: &str,
) -> Result<FeatureCollection> {
    let features = ids
        .iter()
        .map(|&id| to_feature(tree, id, format))
        .collect::<Result<Vec<Feature>>>()?;

    Ok(FeatureCollection {
        bbox: None,
        features,
        foreign_members: None,
    })
}
