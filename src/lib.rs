//! route-optimizer: capacitated, time-windowed vehicle routing.
//!
//! Travel matrices are assembled from a travel-time service in batched,
//! cached blocks, then handed to a guided-local-search solver.

pub mod cache;
pub mod config;
pub mod error;
pub mod google;
pub mod haversine;
pub mod matrix;
pub mod osrm;
pub mod planner;
pub mod problem;
pub mod solution;
pub mod solver;
pub mod traits;
