pub mod queue;
pub mod scan;
