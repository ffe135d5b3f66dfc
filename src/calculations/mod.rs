pub mod urgency;

pub use urgency::{UrgencyEngine, UrgencyResult, apply_urgency};
