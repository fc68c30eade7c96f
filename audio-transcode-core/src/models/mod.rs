pub mod buffer;
pub mod diagnostics;
pub mod error;
pub mod format;
pub mod profile;
pub mod settings;
pub mod state;
