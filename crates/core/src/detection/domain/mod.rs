pub mod detection;
pub mod face_detector;
pub mod face_landmarks;
