pub mod config;
pub mod ports;
pub mod stage;
pub mod state;

pub use config::{BackendAuth, ConfigFile, Configuration};
pub use ports::{PortAllocation, PortMode, PortRole};
pub use stage::{StageId, StageResult, StateUpdate};
pub use state::{BuildState, FolderDescriptor};
