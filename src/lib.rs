//! sipsim: historical backtesting for lump-sum plus recurring-contribution
//! investment strategies.
//!
//! Hexagonal architecture: the simulation engine lives in [`domain`], port
//! traits in [`ports`], concrete implementations in [`adapters`].

pub mod adapters;
pub mod cli;
pub mod domain;
pub mod ports;
