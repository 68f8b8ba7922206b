pub mod broadcast;
pub mod cache;
pub mod chart;
pub mod cli;
pub mod clock;
pub mod config;
pub mod constants;
pub mod error;
pub mod feed;
pub mod logging;
pub mod model;
pub mod poller;
pub mod provider;
pub mod registry;
pub mod scheduler;
pub mod server;
pub mod service;
pub mod tail;
pub mod testkit;
