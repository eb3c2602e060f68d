use serde::{Deserialize, Serialize};

/// Pixel-space bounding box of a face detected in a photo.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl BoundingBox {
    /// Build a box from the `(top, right, bottom, left)` corner order many
    /// face detectors emit.
    pub fn from_trbl(top: f32, right: f32, bottom: f32, left: f32) -> Self {
        Self {
            x: left,
            y: top,
            width: (right - left).max(0.0),
            height: (bottom - top).max(0.0),
        }
    }

    pub fn right(&self) -> f32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f32 {
        self.y + self.height
    }
}

/// Face signature produced by the embedding oracle (128 or 512 floats).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Embedding {
    pub values: Vec<f32>,
}

impl Embedding {
    pub fn new(values: Vec<f32>) -> Self {
        Self { values }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Euclidean distance between two signatures.
    ///
    /// This is the metric the oracle's embedding space is trained for; the
    /// match threshold only has meaning under it. Signatures of different
    /// length are never close: the distance is `f32::INFINITY`.
    pub fn euclidean_distance(&self, other: &Embedding) -> f32 {
        if self.values.len() != other.values.len() {
            return f32::INFINITY;
        }
        self.values
            .iter()
            .zip(other.values.iter())
            .map(|(a, b)| (a - b).powi(2))
            .sum::<f32>()
            .sqrt()
    }
}

impl From<Vec<f32>> for Embedding {
    fn from(values: Vec<f32>) -> Self {
        Self { values }
    }
}

/// A face found in a submitted photo, in oracle order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectedFace {
    #[serde(rename = "box")]
    pub bbox: BoundingBox,
    #[serde(rename = "embedding")]
    pub signature: Embedding,
}

/// An enrolled student's reference signature, rebuilt per upload request.
#[derive(Debug, Clone)]
pub struct KnownFace {
    pub roll_no: String,
    pub signature: Embedding,
}
