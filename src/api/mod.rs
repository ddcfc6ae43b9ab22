pub mod auth;
pub mod client;
pub mod credentials;
pub mod envelope;
pub mod models;
pub mod music;
pub mod retry;
pub mod transport;
