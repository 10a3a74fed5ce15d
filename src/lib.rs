pub mod api;
pub mod config;
pub mod error;
pub mod genome;
pub mod optimizer;
pub mod pool;
pub mod protocol;
pub mod worker;
