//! Model components: tensor bridge, graph encoder, pooling, and the
//! contrastive structure/sequence network.

pub mod bridge;
pub mod gnn;
pub mod net;
pub mod pooling;

pub use gnn::GraphModel;
pub use net::{C3dpConfig, C3dpNet, C3dpOutput};
pub use pooling::Pooling;
