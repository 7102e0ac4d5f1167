pub mod analyzers;
pub mod boundary;
pub mod calendar;
pub mod config;
pub mod daylog;
pub mod fetch;
pub mod loader;
pub mod lock;
pub mod monitor;
pub mod parser;
pub mod record;
pub mod trip;
