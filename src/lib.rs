//! Adaptive-Routing Traffic Simulation Library
//!
//! A sandbox for studying congestion-aware ("smart") routing against static
//! shortest-path routing on a road network. The whole simulation core lives
//! under [`simulation`] and has no rendering or I/O dependencies; drawing,
//! map editing and host bindings are external collaborators that consume the
//! query surface of [`simulation::SimWorld`].

pub mod simulation;
