pub mod config;
pub mod extract;
pub mod metrics;
pub mod scanner;
pub mod worker;
