//! Bounded-concurrency agent scheduling and the agent message bus.

mod agent;
mod bus;
#[allow(clippy::module_inception)]
mod pool;

pub use agent::{AgentRecord, AgentState, TaskOutcome};
pub use bus::{AgentBus, AgentMessage, MessageFilter, BROADCAST_ADDRESS};
pub use pool::{AgentPool, RunReport};
