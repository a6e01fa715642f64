pub mod wire;
pub mod transport;
