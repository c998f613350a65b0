pub mod decoder;
pub mod frame;

pub use decoder::Decoder;
