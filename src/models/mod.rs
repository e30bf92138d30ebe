pub mod assignment;
pub mod config;
pub mod driver;
pub mod matching;
pub mod metrics;
pub mod queue;
pub mod request;
