//! Port traits: the collaborators the engine consumes.

pub mod config_port;
pub mod data_port;
