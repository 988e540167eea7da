pub mod detection_loop;
pub mod inference_worker;
pub mod liveliness_session;
pub mod loop_logger;
pub mod session_config;
