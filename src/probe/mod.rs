pub mod connector;
pub mod evaluator;
pub mod handshake;
pub mod head;
pub mod inspector;

pub use evaluator::evaluate;
pub use inspector::Inspection;
