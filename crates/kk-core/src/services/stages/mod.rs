//! The seven pipeline stages, in their fixed order.

mod backend;
mod cluster;
mod dashboard;
mod prerequisites;
mod secrets_operator;
mod tools;
mod validation;

pub use backend::{parse_folder_list, BackendStage};
pub use cluster::ClusterStage;
pub use dashboard::DashboardStage;
pub use prerequisites::PrerequisitesStage;
pub use secrets_operator::SecretsOperatorStage;
pub use tools::ToolsStage;
pub use validation::ValidationStage;

use crate::services::stage::Stage;

pub fn pipeline() -> Vec<Box<dyn Stage>> {
    vec![
        Box::new(PrerequisitesStage::default()),
        Box::new(ToolsStage::default()),
        Box::new(ClusterStage),
        Box::new(DashboardStage),
        Box::new(SecretsOperatorStage::default()),
        Box::new(BackendStage),
        Box::new(ValidationStage),
    ]
}
