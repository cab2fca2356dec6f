pub mod envelope;
pub mod fragment_handlers;
pub mod health_handlers;
