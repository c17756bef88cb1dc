pub mod cli;
pub mod config;
pub mod executor;

// Re-export the embedding surface
pub use config::Config;
pub use executor::{
    Capability, Database, EventSink, Interpreter, Module, Request, Response, RuntimeError,
    Service, TableHandle, Value,
};
