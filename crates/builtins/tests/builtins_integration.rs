use std::sync::Arc;

use thor_builtins::{Authority, Energy, RewardOutcome};
use thor_common::{Address, BigInt, Hash, WEI_PER_ETHER};
use thor_kv::{InMemoryStore, Store};
use thor_state::{CodeCache, ParamKey, ParamsStore, ProtocolParams, State};
use thor_trie::EMPTY_TRIE_HASH;

struct FixedParams {
    curve_factor: BigInt,
    validator_percentage: BigInt,
}

impl ParamsStore for FixedParams {
    fn get(&self, key: ParamKey) -> BigInt {
        match key {
            ParamKey::CurveFactor => self.curve_factor,
            ParamKey::ValidatorRewardPercentage => self.validator_percentage,
            ParamKey::DelegatorContractAddress => BigInt::zero(),
            ParamKey::MaxBlockProposers => BigInt::zero(),
        }
    }
}

struct NoDelegationsStaker {
    locked_vet: BigInt,
}

impl thor_builtins::Staker for NoDelegationsStaker {
    fn locked_stake(&self, _signer: Address) -> (BigInt, BigInt) {
        (self.locked_vet, BigInt::zero())
    }

    fn has_delegations(&self, _signer: Address) -> bool {
        false
    }

    fn increase_delegators_reward(&mut self, _signer: Address, _reward: BigInt, _current_block: u64) -> bool {
        panic!("should not be called when there are no delegations")
    }
}

fn fresh_state() -> State {
    let store: Arc<dyn Store> = Arc::new(InMemoryStore::new());
    State::state_at(
        store,
        *EMPTY_TRIE_HASH,
        0,
        ProtocolParams {
            growth_rate: BigInt::from(1_000_000_000u64),
            blocks_per_year: 52_560_000,
            seeder_interval: 8640,
            validator_reward_percentage_default: 30,
            curve_factor: BigInt::from(1u64),
            max_block_proposers: 101,
        },
        CodeCache::new(64),
    )
}

/// A proposer is registered and endorsed, selected as a candidate, and then credited a
/// full (no-delegation) reward for producing a block.
#[test]
fn a_candidate_proposer_earns_its_full_block_reward() {
    let mut state = fresh_state();
    let authority = Authority::new(Address::repeat_byte(0xA0));
    let energy = Energy::new(Address::repeat_byte(0xE0));

    let master = Address::repeat_byte(1);
    let endorsor = Address::repeat_byte(2);
    let beneficiary = Address::repeat_byte(6);
    state.set_balance(endorsor, BigInt::from(25_000_000u64) * BigInt::from(WEI_PER_ETHER)).unwrap();

    assert!(authority.add(&mut state, master, endorsor, Hash::zero()).unwrap());
    let candidates = authority.candidates(&mut state, BigInt::from(1u64), usize::MAX).unwrap();
    assert_eq!(candidates.len(), 1);
    assert_eq!(candidates[0].master, master);

    let params = FixedParams {
        curve_factor: BigInt::from(1_000_000u64),
        validator_percentage: BigInt::from(30u64),
    };
    let mut staker = NoDelegationsStaker {
        locked_vet: BigInt::from(25_000_000u64) * BigInt::from(WEI_PER_ETHER),
    };

    // `beneficiary` starts with no balance of its own, so its energy balance before
    // the reward is exactly zero with no growth accrual to account for.
    let reward = match energy
        .distribute_rewards(&mut state, &params, beneficiary, master, &mut staker, 1, 1)
        .unwrap()
    {
        RewardOutcome::Distributed(reward) => reward,
        RewardOutcome::Rejected => panic!("expected a distributed reward"),
    };
    assert!(!reward.is_zero());
    assert_eq!(energy.get(&mut state, beneficiary, 1).unwrap(), reward);
}

#[test]
fn revoked_proposer_drops_out_of_candidate_selection() {
    let mut state = fresh_state();
    let authority = Authority::new(Address::repeat_byte(0xA0));

    let master = Address::repeat_byte(3);
    let endorsor = Address::repeat_byte(4);
    state.set_balance(endorsor, BigInt::from(1_000u64)).unwrap();
    authority.add(&mut state, master, endorsor, Hash::zero()).unwrap();
    assert_eq!(authority.all_candidates(&mut state).unwrap().len(), 1);

    assert!(authority.revoke(&mut state, master).unwrap());
    assert!(authority.all_candidates(&mut state).unwrap().is_empty());

    let (listed, _, _, active) = authority.get(&mut state, master).unwrap();
    assert!(!listed);
    assert!(!active);
}
