//! Model routing under competing quality, cost and latency objectives.
//!
//! The router combines catalog knowledge (published baselines for
//! models with no history) with the tracker's rolling aggregates to
//! pick a model for a task under a strategy and optional constraints.

pub mod router;

pub use router::{CouncilDiversity, ModelRouter, RouterConfig};

#[cfg(test)]
mod tests;
