pub mod authenticator;
pub mod health_service;
pub mod session_service;
pub mod session_store;
