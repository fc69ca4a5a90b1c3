//! Drawable object definitions for the whiteboard.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// A 2D point in board coordinates.
pub type Point = [f64; 2];

/// Identifier for a display object, unique within a room.
///
/// Minted as a UUID v4 by the creating client so that concurrent authors
/// can never collide; treated as an opaque string everywhere else.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObjectId(String);

impl ObjectId {
    /// Mint a fresh globally unique id.
    pub fn random() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ObjectId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for ObjectId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Axis-aligned bounding box `[x0, y0, x1, y1]`.
///
/// Not guaranteed to be normalized while an object is under live
/// construction; call [`Rect::normalized`] once the gesture completes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Rect(pub [f64; 4]);

impl Rect {
    /// A degenerate rect anchored at a single point.
    pub fn at(point: Point) -> Self {
        Self([point[0], point[1], point[0], point[1]])
    }

    pub fn x0(&self) -> f64 {
        self.0[0]
    }

    pub fn y0(&self) -> f64 {
        self.0[1]
    }

    pub fn x1(&self) -> f64 {
        self.0[2]
    }

    pub fn y1(&self) -> f64 {
        self.0[3]
    }

    /// Whether the corners are in canonical order.
    pub fn is_normalized(&self) -> bool {
        self.0[0] <= self.0[2] && self.0[1] <= self.0[3]
    }

    /// Swap corners so that `x0 <= x1` and `y0 <= y1`.
    pub fn normalized(self) -> Self {
        let [mut x0, mut y0, mut x1, mut y1] = self.0;
        if x1 < x0 {
            std::mem::swap(&mut x0, &mut x1);
        }
        if y1 < y0 {
            std::mem::swap(&mut y0, &mut y1);
        }
        Self([x0, y0, x1, y1])
    }

    /// Smallest rect containing every given point.
    pub fn bounding(points: &[Point]) -> Self {
        let first = points.first().copied().unwrap_or([0.0, 0.0]);
        let mut rect = Self::at(first);
        for p in points.iter().skip(1) {
            if p[0] < rect.0[0] {
                rect.0[0] = p[0];
            }
            if p[0] > rect.0[2] {
                rect.0[2] = p[0];
            }
            if p[1] < rect.0[1] {
                rect.0[1] = p[1];
            }
            if p[1] > rect.0[3] {
                rect.0[3] = p[1];
            }
        }
        rect
    }
}

/// Closed set of drawable object types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjectKind {
    Image,
    Line,
    Marker,
    Rectangle,
    Circle,
    Text,
}

/// Type-specific payload: an ordered point sequence for strokes, or an
/// already-encoded image payload for images.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ObjectData {
    Points(Vec<Point>),
    Image(String),
}

impl ObjectData {
    /// Stroke points, if this payload carries any.
    pub fn points(&self) -> Option<&[Point]> {
        match self {
            ObjectData::Points(points) => Some(points),
            ObjectData::Image(_) => None,
        }
    }
}

/// A single visual element with identity and revision.
///
/// Serialized field names match the wire format exactly; optional fields
/// are omitted rather than sent as null.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisplayObject {
    pub id: ObjectId,
    /// Authoring client identifier. Informational, not a security boundary.
    pub owner: String,
    /// Per-object revision, incremented by the authoring client before send.
    pub rev: u64,
    #[serde(rename = "type")]
    pub kind: ObjectKind,
    pub rect: Rect,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<ObjectData>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub family: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Set while the owning client is still interactively drawing this
    /// object. Never persisted set.
    #[serde(
        rename = "activeRendering",
        default,
        skip_serializing_if = "std::ops::Not::not"
    )]
    pub active_rendering: bool,
}

impl DisplayObject {
    fn base(owner: &str, kind: ObjectKind, rect: Rect) -> Self {
        Self {
            id: ObjectId::random(),
            owner: owner.to_string(),
            rev: 0,
            kind,
            rect,
            data: None,
            color: None,
            weight: None,
            size: None,
            family: None,
            text: None,
            active_rendering: false,
        }
    }

    /// A two-point line seeded at its anchor.
    pub fn line(owner: &str, anchor: Point, color: &str, weight: f64) -> Self {
        let mut obj = Self::base(owner, ObjectKind::Line, Rect::at(anchor));
        obj.data = Some(ObjectData::Points(vec![anchor, anchor]));
        obj.color = Some(color.to_string());
        obj.weight = Some(weight);
        obj
    }

    /// A freehand stroke seeded with its first point.
    pub fn marker(owner: &str, anchor: Point, color: &str, weight: f64) -> Self {
        let mut obj = Self::base(owner, ObjectKind::Marker, Rect::at(anchor));
        obj.data = Some(ObjectData::Points(vec![anchor]));
        obj.color = Some(color.to_string());
        obj.weight = Some(weight);
        obj
    }

    pub fn rectangle(owner: &str, anchor: Point, color: &str, weight: f64) -> Self {
        let mut obj = Self::base(owner, ObjectKind::Rectangle, Rect::at(anchor));
        obj.color = Some(color.to_string());
        obj.weight = Some(weight);
        obj
    }

    pub fn circle(owner: &str, anchor: Point, color: &str, weight: f64) -> Self {
        let mut obj = Self::base(owner, ObjectKind::Circle, Rect::at(anchor));
        obj.color = Some(color.to_string());
        obj.weight = Some(weight);
        obj
    }

    pub fn text(owner: &str, anchor: Point, color: &str, text: &str) -> Self {
        let mut obj = Self::base(owner, ObjectKind::Text, Rect::at(anchor));
        obj.color = Some(color.to_string());
        obj.size = Some(16.0);
        obj.family = Some("Helvetica".to_string());
        obj.text = Some(text.to_string());
        obj
    }

    /// An image placed at a fixed rect, payload already encoded.
    pub fn image(owner: &str, rect: Rect, payload: String) -> Self {
        let mut obj = Self::base(owner, ObjectKind::Image, rect);
        obj.data = Some(ObjectData::Image(payload));
        obj
    }

    /// Finalize a live-constructed object: normalize the bounding box
    /// (recomputing it from stroke points and rebasing those points to be
    /// rect-relative for lines and markers) and clear the transient flag.
    pub fn finish_construction(&mut self) {
        match self.kind {
            ObjectKind::Line | ObjectKind::Marker => {
                if let Some(ObjectData::Points(points)) = &mut self.data {
                    let rect = Rect::bounding(points);
                    for p in points.iter_mut() {
                        p[0] -= rect.x0();
                        p[1] -= rect.y0();
                    }
                    self.rect = rect;
                }
            }
            ObjectKind::Rectangle | ObjectKind::Circle => {
                self.rect = self.rect.normalized();
            }
            ObjectKind::Image | ObjectKind::Text => {}
        }
        self.active_rendering = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rect_normalized() {
        let rect = Rect([50.0, 40.0, 10.0, 10.0]);
        assert!(!rect.is_normalized());
        assert_eq!(rect.normalized(), Rect([10.0, 10.0, 50.0, 40.0]));
        assert!(rect.normalized().is_normalized());
    }

    #[test]
    fn test_rect_bounding() {
        let rect = Rect::bounding(&[[5.0, 2.0], [-1.0, 7.0], [3.0, 0.0]]);
        assert_eq!(rect, Rect([-1.0, 0.0, 5.0, 7.0]));
    }

    #[test]
    fn test_wire_field_names() {
        let mut obj = DisplayObject::marker("alice", [1.0, 2.0], "black", 4.0);
        obj.active_rendering = true;
        let json = serde_json::to_value(&obj).unwrap();
        assert_eq!(json["type"], "marker");
        assert_eq!(json["rect"], serde_json::json!([1.0, 2.0, 1.0, 2.0]));
        assert_eq!(json["data"], serde_json::json!([[1.0, 2.0]]));
        assert_eq!(json["activeRendering"], true);
        // Absent optionals are omitted, not null
        assert!(json.get("text").is_none());
    }

    #[test]
    fn test_active_rendering_omitted_when_clear() {
        let obj = DisplayObject::rectangle("alice", [0.0, 0.0], "red", 2.0);
        let json = serde_json::to_value(&obj).unwrap();
        assert!(json.get("activeRendering").is_none());
        // and round-trips back to false
        let back: DisplayObject = serde_json::from_value(json).unwrap();
        assert!(!back.active_rendering);
    }

    #[test]
    fn test_finish_construction_rebases_stroke() {
        let mut obj = DisplayObject::marker("alice", [10.0, 10.0], "black", 4.0);
        obj.active_rendering = true;
        if let Some(ObjectData::Points(points)) = &mut obj.data {
            points.push([4.0, 20.0]);
            points.push([15.0, 6.0]);
        }
        obj.finish_construction();
        assert_eq!(obj.rect, Rect([4.0, 6.0, 15.0, 20.0]));
        assert_eq!(
            obj.data,
            Some(ObjectData::Points(vec![
                [6.0, 4.0],
                [0.0, 14.0],
                [11.0, 0.0],
            ]))
        );
        assert!(!obj.active_rendering);
    }

    #[test]
    fn test_finish_construction_normalizes_shape_rect() {
        let mut obj = DisplayObject::circle("alice", [50.0, 40.0], "blue", 2.0);
        obj.rect = Rect([50.0, 40.0, 10.0, 10.0]);
        obj.finish_construction();
        assert_eq!(obj.rect, Rect([10.0, 10.0, 50.0, 40.0]));
    }

    #[test]
    fn test_object_ids_unique() {
        let a = DisplayObject::line("a", [0.0, 0.0], "black", 1.0);
        let b = DisplayObject::line("a", [0.0, 0.0], "black", 1.0);
        assert_ne!(a.id, b.id);
    }
}
