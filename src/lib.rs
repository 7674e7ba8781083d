pub mod aggregator_core;
pub mod chain;
pub mod pipeline;
