pub mod agent_state;
pub mod config;
pub mod error;
pub mod event;
pub mod run;
pub mod schedule;
pub mod signal;

pub use agent_state::AgentState;
pub use config::Config;
pub use error::{Error, Result};
pub use event::{Event, EventRecord};
pub use run::{Run, RunStatus};
pub use schedule::{ActiveHours, Schedule, ScheduleState};
pub use signal::{Signal, SignalKind};
