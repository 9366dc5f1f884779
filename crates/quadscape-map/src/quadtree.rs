mod node;
mod stitch;
mod update;

pub use node::*;
