pub mod daemon;
pub mod diff;
pub mod export;
pub mod import;
pub mod status;
