pub mod json_lines_sink;
pub mod log_presentation_sink;
pub mod overlay_image_sink;
