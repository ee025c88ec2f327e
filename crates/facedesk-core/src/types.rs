use serde::{Deserialize, Serialize};

/// Bounding box for a detected face, with optional facial landmarks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub confidence: f32,
    /// Five-point facial landmarks: [left_eye, right_eye, nose, left_mouth, right_mouth].
    pub landmarks: Option<[(f32, f32); 5]>,
}

/// Face embedding vector (512-dimensional for ArcFace).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Embedding {
    pub values: Vec<f32>,
    /// Model version that produced this embedding (e.g., "w600k_r50").
    pub model_version: Option<String>,
}

impl Embedding {
    pub fn new(values: Vec<f32>) -> Self {
        Self { values, model_version: None }
    }

    /// Compute Euclidean distance between two embeddings.
    pub fn euclidean_distance(&self, other: &Embedding) -> f32 {
        self.values
            .iter()
            .zip(other.values.iter())
            .map(|(a, b)| (a - b).powi(2))
            .sum::<f32>()
            .sqrt()
    }
}

/// A single detected face: where it is, and the descriptor extracted from it.
#[derive(Debug, Clone)]
pub struct FaceDescriptor {
    pub face: BoundingBox,
    pub embedding: Embedding,
}

/// All descriptors collected for one label, in image processing order.
#[derive(Debug, Clone, PartialEq)]
pub struct LabeledDescriptors {
    pub label: String,
    pub descriptors: Vec<Embedding>,
}

impl LabeledDescriptors {
    /// Mean Euclidean distance from `probe` to every descriptor of this label.
    ///
    /// Returns `None` when the label carries no descriptors.
    pub fn mean_distance(&self, probe: &Embedding) -> Option<f32> {
        if self.descriptors.is_empty() {
            return None;
        }
        let total: f32 = self
            .descriptors
            .iter()
            .map(|d| probe.euclidean_distance(d))
            .sum();
        Some(total / self.descriptors.len() as f32)
    }
}

/// Label reported when no enrolled label is close enough.
pub const UNKNOWN_LABEL: &str = "unknown";

/// Result of matching a probe embedding against the labeled registry.
#[derive(Debug, Clone, Serialize)]
pub struct MatchResult {
    pub matched: bool,
    /// Best label, or [`UNKNOWN_LABEL`] when nothing is within the threshold.
    pub label: String,
    /// Distance of the best candidate (lower = more similar); `None` when
    /// nothing is enrolled.
    pub distance: Option<f32>,
}

impl MatchResult {
    fn unknown(distance: Option<f32>) -> Self {
        Self {
            matched: false,
            label: UNKNOWN_LABEL.to_string(),
            distance,
        }
    }
}

/// Strategy for comparing a probe embedding against labeled descriptors.
pub trait Matcher {
    fn compare(
        &self,
        probe: &Embedding,
        gallery: &[LabeledDescriptors],
        threshold: f32,
    ) -> MatchResult;
}

/// Nearest-label matcher using mean Euclidean distance per label.
///
/// A probe matches the label with the smallest mean distance, provided that
/// distance does not exceed the threshold.
pub struct EuclideanMatcher;

impl Matcher for EuclideanMatcher {
    fn compare(
        &self,
        probe: &Embedding,
        gallery: &[LabeledDescriptors],
        threshold: f32,
    ) -> MatchResult {
        let best = gallery
            .iter()
            .filter_map(|entry| entry.mean_distance(probe).map(|d| (entry, d)))
            .min_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));

        match best {
            Some((entry, distance)) if distance <= threshold => MatchResult {
                matched: true,
                label: entry.label.clone(),
                distance: Some(distance),
            },
            Some((_, distance)) => MatchResult::unknown(Some(distance)),
            None => MatchResult::unknown(None),
        }
    }
}
