// Face landmark platform integration

pub mod mediapipe_bridge;

pub use mediapipe_bridge::{DefaultLandmarkProvider, LandmarkProvider, StaticLandmarks};
