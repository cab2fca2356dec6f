pub mod convert;
pub mod fragment_service;
