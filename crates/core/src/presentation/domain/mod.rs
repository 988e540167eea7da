pub mod presentation_sink;
