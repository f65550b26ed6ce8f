//! Control flow nodes
//!
//! Branching via skipped outputs, loops via re-arming, delays.

mod accumulator_loop;
mod decision;
mod trigger_detection;
mod wait;

pub use accumulator_loop::AccumulatorLoopNode;
pub use decision::{Comparison, DecisionNode};
pub use trigger_detection::TriggerDetectionNode;
pub use wait::WaitNode;
