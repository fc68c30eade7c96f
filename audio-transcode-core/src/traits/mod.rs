pub mod delegate;
pub mod encoder;
