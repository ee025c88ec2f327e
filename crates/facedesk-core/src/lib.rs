//! facedesk-core: face descriptors and labeled matching.
//!
//! Uses SCRFD for face detection and ArcFace for face descriptors, both
//! running via ONNX Runtime for CPU inference, plus the labeled descriptor
//! registry served to recognition clients.

pub mod alignment;
pub mod detector;
pub mod extractor;
pub mod label;
pub mod recognizer;
pub mod registry;
pub mod types;

pub use detector::FaceDetector;
pub use extractor::{decode_image, load_image, DecodeError, DescriptorExtractor, ExtractError, OnnxExtractor};
pub use label::{Label, LabelError};
pub use recognizer::FaceRecognizer;
pub use registry::{Registry, WireEntry};
pub use types::{
    BoundingBox, Embedding, EuclideanMatcher, FaceDescriptor, LabeledDescriptors, MatchResult, Matcher,
    UNKNOWN_LABEL,
};
