use crate::{Error, Result};
use geojson::{Feature, Geometry};
use serde_json::{Map, Value};

/// A value that can describe itself as a GeoJSON geometry object.
///
/// This is the Rust equivalent of the `__geo_interface__` protocol.
pub trait GeoInterface {
    /// Returns this value's GeoJSON geometry object, or `None` if it has no
    /// geometry.
    fn geo_interface(&self) -> Option<Map<String, Value>>;
}

/// Anything that can be turned into an intersects geometry.
#[derive(Debug, Clone, PartialEq)]
pub enum IntersectsLike {
    /// A geometry object.
    Object(Map<String, Value>),

    /// A JSON-encoded geometry object.
    Json(String),

    /// A JSON value that should be a geometry object.
    Value(Value),

    /// The result of [GeoInterface::geo_interface].
    GeoInterface(Option<Map<String, Value>>),
}

/// Normalizes an intersects geometry into a JSON object.
///
/// The geometry itself is opaque, only its shape (an object) is checked.
///
/// # Examples
///
/// ```
/// use stac_client::normalize_intersects;
/// use geojson::{Geometry, Value};
///
/// let point = Geometry::new(Value::Point(vec![-105.1, 41.1]));
/// let intersects = normalize_intersects(&point).unwrap();
/// assert_eq!(intersects["type"], "Point");
///
/// let intersects = normalize_intersects(r#"{"type":"Point","coordinates":[0,0]}"#).unwrap();
/// assert_eq!(intersects["type"], "Point");
/// ```
pub fn normalize_intersects(intersects: impl Into<IntersectsLike>) -> Result<Map<String, Value>> {
    match intersects.into() {
        IntersectsLike::Object(map) => Ok(map),
        IntersectsLike::Json(s) => match serde_json::from_str::<Value>(&s) {
            Ok(Value::Object(map)) => Ok(map),
            _ => Err(Error::InvalidIntersects(s)),
        },
        IntersectsLike::Value(Value::Object(map)) => Ok(map),
        IntersectsLike::Value(value) => Err(Error::InvalidIntersects(value.to_string())),
        IntersectsLike::GeoInterface(Some(map)) => Ok(map),
        IntersectsLike::GeoInterface(None) => {
            Err(Error::InvalidIntersects("value has no geometry".to_string()))
        }
    }
}

impl IntersectsLike {
    /// Creates an intersects from anything implementing [GeoInterface].
    pub fn from_geo_interface(value: &impl GeoInterface) -> IntersectsLike {
        IntersectsLike::GeoInterface(value.geo_interface())
    }
}

impl GeoInterface for Geometry {
    fn geo_interface(&self) -> Option<Map<String, Value>> {
        match serde_json::to_value(self) {
            Ok(Value::Object(map)) => Some(map),
            _ => None,
        }
    }
}

impl GeoInterface for geojson::Value {
    fn geo_interface(&self) -> Option<Map<String, Value>> {
        Geometry::new(self.clone()).geo_interface()
    }
}

impl GeoInterface for Feature {
    fn geo_interface(&self) -> Option<Map<String, Value>> {
        self.geometry.as_ref().and_then(GeoInterface::geo_interface)
    }
}

impl From<Map<String, Value>> for IntersectsLike {
    fn from(map: Map<String, Value>) -> IntersectsLike {
        IntersectsLike::Object(map)
    }
}

impl From<&str> for IntersectsLike {
    fn from(s: &str) -> IntersectsLike {
        IntersectsLike::Json(s.to_string())
    }
}

impl From<String> for IntersectsLike {
    fn from(s: String) -> IntersectsLike {
        IntersectsLike::Json(s)
    }
}

impl From<Value> for IntersectsLike {
    fn from(value: Value) -> IntersectsLike {
        IntersectsLike::Value(value)
    }
}

impl From<&Geometry> for IntersectsLike {
    fn from(geometry: &Geometry) -> IntersectsLike {
        IntersectsLike::from_geo_interface(geometry)
    }
}

impl From<Geometry> for IntersectsLike {
    fn from(geometry: Geometry) -> IntersectsLike {
        IntersectsLike::from_geo_interface(&geometry)
    }
}

impl From<&Feature> for IntersectsLike {
    fn from(feature: &Feature) -> IntersectsLike {
        IntersectsLike::from_geo_interface(feature)
    }
}

impl From<Feature> for IntersectsLike {
    fn from(feature: Feature) -> IntersectsLike {
        IntersectsLike::from_geo_interface(&feature)
    }
}

impl From<geojson::Value> for IntersectsLike {
    fn from(value: geojson::Value) -> IntersectsLike {
        IntersectsLike::from_geo_interface(&value)
    }
}
