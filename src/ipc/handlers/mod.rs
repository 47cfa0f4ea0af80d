pub mod backup;
pub mod core;
pub mod scores;
pub mod session;
pub mod setup;
pub mod sheets;
