use thor_common::{Address, BigInt};

/// External collaborator the Energy builtin consumes for stake-weighted rewards (§6);
/// not implemented by this crate — the node's proof-of-stake module provides it.
pub trait Staker {
    /// `(locked_vet, locked_weight)` for the current signer.
    fn locked_stake(&self, signer: Address) -> (BigInt, BigInt);

    fn has_delegations(&self, signer: Address) -> bool;

    /// Credits delegators of `signer`'s stake pool with `reward` at `current_block`.
    /// `false` on a routine rejection, in which case the caller must credit nothing;
    /// [`crate::energy::Energy::distribute_rewards`] surfaces this as
    /// [`crate::energy::RewardOutcome::Rejected`] rather than `Result::Err`.
    fn increase_delegators_reward(&mut self, signer: Address, reward: BigInt, current_block: u64) -> bool;
}
