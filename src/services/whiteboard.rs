//! Whiteboard reconciler: applies object-level deltas to a room's document.
//!
//! DESIGN
//! ======
//! The whiteboard is a flat collection of drawable objects keyed by a
//! client-generated string id. Reconciliation is last-write-wins per id:
//! the server's arrival order is the authoritative order, and no attempt is
//! made to merge concurrent edits to the same object.
//!
//! `apply` is pure with respect to everything except the document it
//! mutates and runs entirely under the room map's write lock, so deltas
//! from different connections never interleave mid-application.
//!
//! EDGE CASES
//! ==========
//! - `object-added` for an existing id is a no-op (first writer wins for
//!   creation; a replayed add cannot duplicate an object).
//! - `object-modified` for a missing id is an implicit add (tolerates an
//!   add/modify pair arriving out of order).
//! - An object's kind is immutable after creation; a modify that claims a
//!   different kind keeps the stored shape payload.
//! - Objects arriving without an id are assigned one before storage so the
//!   one-object-per-id invariant always holds.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Background color of a freshly created or cleared whiteboard.
pub const DEFAULT_BACKGROUND: &str = "#ffffff";

// =============================================================================
// DOCUMENT MODEL
// =============================================================================

/// A room's whiteboard: drawable objects plus a background color.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WhiteboardDoc {
    pub objects: Vec<DrawableObject>,
    pub background_color: String,
}

impl Default for WhiteboardDoc {
    fn default() -> Self {
        Self { objects: Vec::new(), background_color: DEFAULT_BACKGROUND.to_string() }
    }
}

impl WhiteboardDoc {
    /// Look up an object by id.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<&DrawableObject> {
        self.objects.iter().find(|obj| obj.id == id)
    }
}

/// One element on the whiteboard. `id` is the merge key for every delta
/// kind; the shape tag is flattened so the wire form is
/// `{"id":"o1","left":10,"top":10,"type":"rect","width":50,"height":50}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DrawableObject {
    /// Client-generated, unique within the document. Empty means the client
    /// did not supply one and the reconciler must assign it.
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub left: f64,
    #[serde(default)]
    pub top: f64,
    #[serde(flatten)]
    pub shape: Shape,
}

/// Per-kind geometry and style. A closed sum type rather than an open
/// record: the reconciler and renderer both get exhaustiveness checking
/// over the drawable kinds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum Shape {
    Rect {
        #[serde(default)]
        width: f64,
        #[serde(default)]
        height: f64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        fill: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        stroke: Option<String>,
        #[serde(default)]
        angle: f64,
    },
    Circle {
        #[serde(default)]
        radius: f64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        fill: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        stroke: Option<String>,
    },
    Triangle {
        #[serde(default)]
        width: f64,
        #[serde(default)]
        height: f64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        fill: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        stroke: Option<String>,
        #[serde(default)]
        angle: f64,
    },
    Path {
        /// Raw path commands as produced by the drawing surface; the server
        /// never interprets them.
        #[serde(default)]
        path: serde_json::Value,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        stroke: Option<String>,
        #[serde(default)]
        stroke_width: f64,
    },
    Text {
        #[serde(default)]
        text: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        font_size: Option<f64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        font_family: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        fill: Option<String>,
    },
}

impl Shape {
    /// Wire name of the shape kind.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Rect { .. } => "rect",
            Self::Circle { .. } => "circle",
            Self::Triangle { .. } => "triangle",
            Self::Path { .. } => "path",
            Self::Text { .. } => "text",
        }
    }
}

// =============================================================================
// DELTAS
// =============================================================================

/// One incremental whiteboard mutation as carried by `whiteboard-update`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum WhiteboardDelta {
    ObjectAdded { object: DrawableObject },
    ObjectModified { object: DrawableObject },
    ObjectRemoved { object_id: String },
    Clear,
    FullSync { canvas_data: WhiteboardDoc },
    /// Delta kinds this server does not know. Decoded without error so a
    /// newer client cannot crash the handler; dropped on apply.
    #[serde(other)]
    Unknown,
}

// =============================================================================
// RECONCILIATION
// =============================================================================

/// Apply one delta to a document. Returns the normalized delta to broadcast
/// (with any server-assigned ids filled in), or `None` when the delta is an
/// unknown kind and there is nothing meaningful to relay.
pub fn apply(doc: &mut WhiteboardDoc, delta: WhiteboardDelta) -> Option<WhiteboardDelta> {
    match delta {
        WhiteboardDelta::ObjectAdded { mut object } => {
            ensure_id(&mut object);
            if doc.get(&object.id).is_none() {
                doc.objects.push(object.clone());
            }
            Some(WhiteboardDelta::ObjectAdded { object })
        }
        WhiteboardDelta::ObjectModified { mut object } => {
            ensure_id(&mut object);
            if let Some(existing) = doc.objects.iter_mut().find(|obj| obj.id == object.id) {
                // Kind is immutable post-creation: a modify claiming a
                // different kind keeps the stored shape payload.
                if existing.shape.kind() == object.shape.kind() {
                    *existing = object.clone();
                } else {
                    existing.left = object.left;
                    existing.top = object.top;
                    object = existing.clone();
                }
            } else {
                // Implicit add: modify arrived before (or instead of) add.
                doc.objects.push(object.clone());
            }
            Some(WhiteboardDelta::ObjectModified { object })
        }
        WhiteboardDelta::ObjectRemoved { object_id } => {
            doc.objects.retain(|obj| obj.id != object_id);
            Some(WhiteboardDelta::ObjectRemoved { object_id })
        }
        WhiteboardDelta::Clear => {
            doc.objects.clear();
            doc.background_color = DEFAULT_BACKGROUND.to_string();
            Some(WhiteboardDelta::Clear)
        }
        WhiteboardDelta::FullSync { mut canvas_data } => {
            normalize_snapshot(&mut canvas_data);
            *doc = canvas_data.clone();
            Some(WhiteboardDelta::FullSync { canvas_data })
        }
        WhiteboardDelta::Unknown => None,
    }
}

fn ensure_id(object: &mut DrawableObject) {
    if object.id.is_empty() {
        object.id = Uuid::new_v4().to_string();
    }
}

/// Enforce the one-object-per-id invariant on a client-supplied snapshot:
/// assign missing ids and, on collision, keep the last occurrence.
fn normalize_snapshot(doc: &mut WhiteboardDoc) {
    for object in &mut doc.objects {
        ensure_id(object);
    }
    let mut deduped: Vec<DrawableObject> = Vec::with_capacity(doc.objects.len());
    for object in doc.objects.drain(..) {
        if let Some(existing) = deduped.iter_mut().find(|obj| obj.id == object.id) {
            *existing = object;
        } else {
            deduped.push(object);
        }
    }
    doc.objects = deduped;
}

#[cfg(test)]
#[path = "whiteboard_test.rs"]
mod tests;
