pub mod media_session;
pub mod queue;
pub mod session;
