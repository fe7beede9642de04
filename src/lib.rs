pub mod artifact;
pub mod audit;
pub mod config;
pub mod environment;
pub mod errors;
pub mod init;
pub mod ledger;
pub mod lock;
pub mod logging;
pub mod rpc;
pub mod runner;
pub mod step;
pub mod ui;
pub mod waypoint_config;
