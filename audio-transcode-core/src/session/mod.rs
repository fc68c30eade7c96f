pub mod control;
pub(crate) mod dispatch;
pub mod transcoder;
