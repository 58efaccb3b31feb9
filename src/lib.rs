pub mod cli;
pub mod config;
pub mod device;
pub mod error;
pub mod events;
pub mod job_store;
pub mod orchestrator;
pub mod parsers;
pub mod publisher;
pub mod registry;
pub mod report;
pub mod request;
pub mod rpc;
pub mod tree;
pub mod util;
