pub mod cli;
pub mod config;
pub mod error;
pub mod fetch;
pub mod http;
pub mod ledger;
pub mod logging;
pub mod orchestrator;
pub mod part;
pub mod progress;
pub mod proxy;
