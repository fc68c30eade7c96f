pub mod bitrate;
pub mod buffer_adapter;
pub mod format_model;
