pub mod app;
pub mod cli;
pub mod keys;
pub mod logging;
pub mod prompt;
pub mod report;
pub mod ui;
