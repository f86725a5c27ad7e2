pub mod collapse;
pub mod composer;
pub mod cycle;
pub mod evaluator;
pub mod planner;
pub mod thresholds;

pub use cycle::AlertEngine;
