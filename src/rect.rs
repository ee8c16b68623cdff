use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};

/// A geographic coordinate in degrees.
///
/// Latitude is expected in the [-90..90] range and longitude in the [-180..180] range.
/// Values outside those ranges are not rejected; geometry built from them is simply meaningless.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    /// Latitude (y)
    pub latitude: f64,

    /// Longitude (x)
    pub longitude: f64,
}

impl GeoPoint {
    /// Create a new coordinate from a latitude and a longitude, in that order.
    pub const fn new(latitude: f64, longitude: f64) -> Self {
        GeoPoint {
            latitude,
            longitude,
        }
    }
}

/// An axis-aligned latitude/longitude rectangle.
///
/// A rectangle whose north-east longitude is smaller than its south-west longitude crosses the
/// ±180° meridian. It covers `[southwest.longitude, 180]` and `[-180, northeast.longitude]` over
/// the same latitude band, and every test against it is performed on those two parts.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct GeoRect {
    southwest: GeoPoint,
    northeast: GeoPoint,
}

impl GeoRect {
    /// The rectangle covering the whole earth.
    pub const WORLD: GeoRect = GeoRect::new(
        GeoPoint::new(-90.0, -180.0),
        GeoPoint::new(90.0, 180.0),
    );

    /// Create a rectangle from its south-west and north-east corners.
    ///
    /// # Arguments
    ///
    /// - `southwest`: The corner with the smallest latitude and the western longitude.
    /// - `northeast`: The corner with the largest latitude and the eastern longitude.
    ///
    /// # Returns
    ///
    /// A simple rectangle, or one crossing the antimeridian when `northeast` lies west of `southwest`.
    pub const fn new(southwest: GeoPoint, northeast: GeoPoint) -> Self {
        GeoRect {
            southwest,
            northeast,
        }
    }

    /// The rectangle covering the whole earth, (-90, -180) to (90, 180).
    pub fn whole_earth() -> Self {
        Self::WORLD
    }

    /// Compute the tightest simple rectangle enclosing a set of points.
    ///
    /// # Arguments
    ///
    /// - `points`: The points to enclose.
    ///
    /// # Returns
    ///
    /// The rectangle spanning the minimum and maximum latitude and longitude of the points,
    /// or `None` if there are no points.
    pub fn bounding<I>(points: I) -> Option<Self>
    where
        I: IntoIterator<Item = GeoPoint>,
    {
        let mut points = points.into_iter();
        let first = points.next()?;

        let mut min = first;
        let mut max = first;

        for point in points {
            min.latitude = min.latitude.min(point.latitude);
            min.longitude = min.longitude.min(point.longitude);
            max.latitude = max.latitude.max(point.latitude);
            max.longitude = max.longitude.max(point.longitude);
        }

        Some(GeoRect::new(min, max))
    }

    pub fn southwest(&self) -> GeoPoint {
        self.southwest
    }

    pub fn northeast(&self) -> GeoPoint {
        self.northeast
    }

    /// Whether the rectangle crosses the ±180° meridian.
    pub fn is_wrapping(&self) -> bool {
        self.northeast.longitude < self.southwest.longitude
    }

    /// Split a rectangle crossing the antimeridian into its two simple parts.
    ///
    /// # Returns
    ///
    /// The eastern part `[southwest.longitude, 180]` and the western part
    /// `[-180, northeast.longitude]`, or `None` for a simple rectangle.
    pub fn parts(&self) -> Option<(GeoRect, GeoRect)> {
        if !self.is_wrapping() {
            return None;
        }

        let eastern = GeoRect::new(
            self.southwest,
            GeoPoint::new(self.northeast.latitude, 180.0),
        );
        let western = GeoRect::new(
            GeoPoint::new(self.southwest.latitude, -180.0),
            self.northeast,
        );

        Some((eastern, western))
    }

    /// Check whether the areas covered by two rectangles overlap.
    ///
    /// Rectangles that only share an edge do not intersect. Either operand may cross the
    /// antimeridian, in which case each of its parts is tested separately.
    ///
    /// # Arguments
    ///
    /// - `other`: The rectangle to test against.
    ///
    /// # Returns
    ///
    /// `true` if any part of `self` overlaps any part of `other`.
    pub fn intersects(&self, other: &GeoRect) -> bool {
        if let Some((eastern, western)) = self.parts() {
            return eastern.intersects(other) || western.intersects(other);
        }

        if let Some((eastern, western)) = other.parts() {
            return self.intersects(&eastern) || self.intersects(&western);
        }

        other.southwest.longitude < self.northeast.longitude
            && self.southwest.longitude < other.northeast.longitude
            && other.southwest.latitude < self.northeast.latitude
            && self.southwest.latitude < other.northeast.latitude
    }

    /// Check whether a point lies inside the rectangle, edges included.
    ///
    /// # Arguments
    ///
    /// - `point`: The point to test.
    ///
    /// # Returns
    ///
    /// `true` if the point lies in the rectangle, or in either of its parts when it crosses the antimeridian.
    pub fn contains(&self, point: &GeoPoint) -> bool {
        if let Some((eastern, western)) = self.parts() {
            return eastern.contains(point) || western.contains(point);
        }

        point.longitude >= self.southwest.longitude
            && point.longitude <= self.northeast.longitude
            && point.latitude >= self.southwest.latitude
            && point.latitude <= self.northeast.latitude
    }
}

impl Display for GeoRect {
    fn fmt(&self, f: &mut Formatter) -> FmtResult {
        write!(
            f,
            "SW: ({}, {}), NE: ({}, {})",
            self.southwest.latitude,
            self.southwest.longitude,
            self.northeast.latitude,
            self.northeast.longitude
        )
    }
}
