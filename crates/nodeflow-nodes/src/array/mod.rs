//! Array socket nodes

mod array_flatten;
mod prefix_array;

pub use array_flatten::ArrayFlattenNode;
pub use prefix_array::PrefixArrayNode;
