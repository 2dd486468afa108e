//! Off-policy actor-critic agent over a finite action set.
mod base;
mod config;
pub use base::ActorCritic;
pub use config::ActorCriticConfig;
