//! # thor-builtins
//!
//! Native contracts that live directly on top of [`thor_state::State`] rather than
//! behind an EVM call: the proposer registry ([`authority::Authority`]) and the
//! VET-driven gas-token ledger ([`energy::Energy`]). Neither owns a `State` — every
//! method takes one by reference, so callers compose these with whatever
//! checkpoint/revert scope they're already running a transaction in.
//!
//! ## Modules
//!
//! - [`authority`]: [`authority::Authority`], the proposer doubly-linked list (§4.7).
//! - [`energy`]: [`energy::Energy`], growth-rate accrual and reward distribution (§4.8).
//! - [`staker`]: [`staker::Staker`], the proof-of-stake collaborator `Energy` consumes
//!   but does not implement.
//! - [`error`]: [`error::AuthorityError`] / [`error::EnergyError`].

pub mod authority;
pub mod energy;
pub mod error;
pub mod staker;

pub use authority::{Authority, Candidate};
pub use energy::{Energy, RewardOutcome};
pub use error::{AuthorityError, EnergyError};
pub use staker::Staker;
