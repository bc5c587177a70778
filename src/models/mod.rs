pub mod agent;
pub mod event;
pub mod node;
pub mod session;
pub mod wave;

pub use agent::{Agent, AgentStatus};
pub use event::{EventKind, RegistryEvent};
pub use node::{Node, NodeId, NodeStatus};
pub use session::{OrchestrationSession, SessionStatus};
pub use wave::{Wave, WaveStatus};
