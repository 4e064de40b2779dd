//! Shared library surface for the USS server and its tests.

pub mod api;
pub mod config;
pub mod lifecycle;
pub mod persistence;
pub mod state;
