pub mod decision;

pub use decision::DecisionTracker;
