pub mod audit;
pub mod bootstrap;
pub mod cli;
pub mod runtime;
pub mod state;
pub mod transport;
