//! Scenario-based tests for backhaul

mod credentials;
mod includes;
mod ordering;
mod snapshots;
