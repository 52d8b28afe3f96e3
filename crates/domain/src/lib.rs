pub mod config;
pub mod error;
pub mod escalation;
pub mod message;
pub mod reply;
pub mod trace;
pub mod turn;
pub mod welcome;
