pub mod board;
pub mod calculations;
pub mod calendar;
pub mod clock;
pub mod event;
pub mod graph;
pub mod persistence;
pub mod pipeline;
pub mod profile;
pub mod task;

#[cfg(any(feature = "cli_api", feature = "http_api"))]
pub mod http_api;

pub use board::TaskBoard;
pub use calendar::{ScheduleWindow, TimeSlot};
pub use clock::Clock;
pub use event::Event;
pub use pipeline::{RunOptions, RunOutcome, run_pipeline};
pub use profile::WorkProfile;
pub use task::Task;
