//! Core services consumed by the connection bridge.

pub mod live;
