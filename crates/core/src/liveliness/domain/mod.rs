pub mod aggregation_policy;
pub mod liveliness_classifier;
pub mod liveliness_state;
