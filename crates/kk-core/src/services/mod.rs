pub mod command;
pub mod config_loader;
pub mod crd;
pub mod manifests;
pub mod orchestrator;
pub mod ports;
pub mod prompt;
pub mod stage;
pub mod stages;
pub mod state;
pub mod tools;
pub mod uninstall;
