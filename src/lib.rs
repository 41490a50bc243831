pub mod app;
pub mod auth;
pub mod cli;
pub mod clock;
pub mod config;
pub mod enroll;
pub mod fmt;
pub mod logging;
pub mod obs;
pub mod signals;
pub mod targets;
pub mod utils;
