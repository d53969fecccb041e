use bytes::{BufMut, Bytes};
use thor_common::{Address, BigInt, WEI_PER_ETHER};
use thor_crypto::blake2b256;
use thor_rlp::decode::RLPDecode;
use thor_rlp::encode::RLPEncode;
use thor_rlp::error::RLPDecodeError;
use thor_rlp::structs::{Decoder, Encoder};
use thor_state::{ParamKey, ParamsStore, State};
use tracing::debug;

use crate::error::EnergyError;
use crate::staker::Staker;

/// Floor integer square root via Newton's method; `U256` has no built-in sqrt.
fn isqrt(n: BigInt) -> BigInt {
    if n.is_zero() {
        return BigInt::zero();
    }
    let mut x = n;
    let mut y = (x + BigInt::from(1u64)) / BigInt::from(2u64);
    while y < x {
        x = y;
        y = (x + n / x) / BigInt::from(2u64);
    }
    x
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct InitialSupply {
    token: BigInt,
    energy: BigInt,
    block_time: u64,
}

impl RLPEncode for InitialSupply {
    fn encode(&self, buf: &mut dyn BufMut) {
        Encoder::new(buf)
            .encode_field(&self.token)
            .encode_field(&self.energy)
            .encode_field(&self.block_time)
            .finish();
    }
}

impl RLPDecode for InitialSupply {
    fn decode_unfinished(buf: &[u8]) -> Result<(Self, &[u8]), RLPDecodeError> {
        let decoder = Decoder::new(buf)?;
        let (token, decoder) = decoder.decode_field("token")?;
        let (energy, decoder) = decoder.decode_field("energy")?;
        let (block_time, decoder) = decoder.decode_field("block_time")?;
        let rest = decoder.finish()?;
        Ok((InitialSupply { token, energy, block_time }, rest))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct TotalAddSub {
    total_add: BigInt,
    total_sub: BigInt,
}

impl RLPEncode for TotalAddSub {
    fn encode(&self, buf: &mut dyn BufMut) {
        Encoder::new(buf)
            .encode_field(&self.total_add)
            .encode_field(&self.total_sub)
            .finish();
    }
}

impl RLPDecode for TotalAddSub {
    fn decode_unfinished(buf: &[u8]) -> Result<(Self, &[u8]), RLPDecodeError> {
        let decoder = Decoder::new(buf)?;
        let (total_add, decoder) = decoder.decode_field("total_add")?;
        let (total_sub, decoder) = decoder.decode_field("total_sub")?;
        let rest = decoder.finish()?;
        Ok((TotalAddSub { total_add, total_sub }, rest))
    }
}

/// VET-balance-driven gas-token ledger (§4.8): growth-rate-bounded accrual on top of
/// [`State`]'s own `get_energy`/`set_energy`, plus the supply bookkeeping
/// (`initial-supply`, `total-add-sub`, `issued`, growth-stop time) an EVM-visible
/// `totalSupply()` needs.
pub struct Energy {
    addr: Address,
}

impl Energy {
    pub fn new(addr: Address) -> Self {
        Self { addr }
    }

    fn initial_supply_key() -> thor_common::Hash {
        blake2b256(b"initial-supply")
    }

    fn total_add_sub_key() -> thor_common::Hash {
        blake2b256(b"total-add-sub")
    }

    fn issued_key() -> thor_common::Hash {
        blake2b256(b"issued")
    }

    fn growth_stop_key() -> thor_common::Hash {
        blake2b256(b"growth-stop-time")
    }

    fn load_initial_supply(&self, state: &mut State) -> Result<InitialSupply, EnergyError> {
        let raw = state.get_raw_storage(self.addr, Self::initial_supply_key())?;
        if raw.is_empty() {
            Ok(InitialSupply::default())
        } else {
            Ok(InitialSupply::decode(&raw)?)
        }
    }

    fn save_initial_supply(&self, state: &mut State, value: &InitialSupply) -> Result<(), EnergyError> {
        state.set_raw_storage(self.addr, Self::initial_supply_key(), Bytes::from(value.encode_to_vec()))?;
        Ok(())
    }

    fn load_totals(&self, state: &mut State) -> Result<TotalAddSub, EnergyError> {
        let raw = state.get_raw_storage(self.addr, Self::total_add_sub_key())?;
        if raw.is_empty() {
            Ok(TotalAddSub::default())
        } else {
            Ok(TotalAddSub::decode(&raw)?)
        }
    }

    fn save_totals(&self, state: &mut State, value: &TotalAddSub) -> Result<(), EnergyError> {
        state.set_raw_storage(self.addr, Self::total_add_sub_key(), Bytes::from(value.encode_to_vec()))?;
        Ok(())
    }

    fn load_issued(&self, state: &mut State) -> Result<BigInt, EnergyError> {
        let raw = state.get_raw_storage(self.addr, Self::issued_key())?;
        if raw.is_empty() {
            Ok(BigInt::zero())
        } else {
            Ok(BigInt::decode(&raw)?)
        }
    }

    fn save_issued(&self, state: &mut State, value: BigInt) -> Result<(), EnergyError> {
        state.set_raw_storage(self.addr, Self::issued_key(), Bytes::from(value.encode_to_vec()))?;
        Ok(())
    }

    /// `None` means growth has never been stopped ("∞" in the spec's terms) — the
    /// idiomatic stand-in for a sentinel value.
    pub fn get_energy_growth_stop_time(&self, state: &mut State) -> Result<Option<u64>, EnergyError> {
        let raw = state.get_raw_storage(self.addr, Self::growth_stop_key())?;
        if raw.is_empty() {
            Ok(None)
        } else {
            Ok(Some(u64::decode(&raw)?))
        }
    }

    /// Idempotent: a second call after growth is already stopped leaves the recorded
    /// stop time untouched.
    pub fn stop_energy_growth(&self, state: &mut State, block_time: u64) -> Result<(), EnergyError> {
        if self.get_energy_growth_stop_time(state)?.is_some() {
            return Ok(());
        }
        state.set_raw_storage(self.addr, Self::growth_stop_key(), Bytes::from(block_time.encode_to_vec()))?;
        Ok(())
    }

    pub fn get(&self, state: &mut State, addr: Address, block_time: u64) -> Result<BigInt, EnergyError> {
        Ok(state.get_energy(addr, block_time)?)
    }

    pub fn add(&self, state: &mut State, addr: Address, amount: BigInt, block_time: u64) -> Result<(), EnergyError> {
        let energy = state.get_energy(addr, block_time)?;
        state.set_energy(addr, energy + amount, block_time)?;
        let mut totals = self.load_totals(state)?;
        totals.total_add = totals.total_add + amount;
        self.save_totals(state, &totals)
    }

    /// `Ok(false)` on insufficient balance; nothing is charged in that case.
    pub fn sub(&self, state: &mut State, addr: Address, amount: BigInt, block_time: u64) -> Result<bool, EnergyError> {
        let energy = state.get_energy(addr, block_time)?;
        if energy < amount {
            debug!(?addr, "energy.sub: insufficient balance");
            return Ok(false);
        }
        state.set_energy(addr, energy - amount, block_time)?;
        let mut totals = self.load_totals(state)?;
        totals.total_sub = totals.total_sub + amount;
        self.save_totals(state, &totals)?;
        Ok(true)
    }

    pub fn set_initial_supply(&self, state: &mut State, token: BigInt, energy: BigInt, block_time: u64) -> Result<(), EnergyError> {
        self.save_initial_supply(state, &InitialSupply { token, energy, block_time })
    }

    pub fn token_total_supply(&self, state: &mut State) -> Result<BigInt, EnergyError> {
        Ok(self.load_initial_supply(state)?.token)
    }

    pub fn total_burned(&self, state: &mut State) -> Result<BigInt, EnergyError> {
        let totals = self.load_totals(state)?;
        Ok(totals.total_sub.checked_sub(totals.total_add).unwrap_or_else(BigInt::zero))
    }

    /// `initial.energy + growth(initial.token, initial.block_time, min(block_time, stop_time)) + issued`.
    pub fn total_supply(&self, state: &mut State, block_time: u64) -> Result<BigInt, EnergyError> {
        let initial = self.load_initial_supply(state)?;
        let issued = self.load_issued(state)?;
        let stop_time = self.get_energy_growth_stop_time(state)?;
        let effective_end = match stop_time {
            Some(stop) => block_time.min(stop),
            None => block_time,
        };
        let growth_rate = state.params().growth_rate;
        let growth = if effective_end > initial.block_time {
            let delta_t = BigInt::from(effective_end - initial.block_time);
            delta_t * initial.token * growth_rate / BigInt::from(WEI_PER_ETHER)
        } else {
            BigInt::zero()
        };
        Ok(initial.energy + growth + issued)
    }

    /// `curve_factor × sqrt(locked_vet / 1e18) × 1e18 / blocks_per_year`, floor integer
    /// sqrt, `curve_factor` read live from `params` rather than baked into the
    /// protocol-wide constants. `blocks_per_year` is reduced by `seeder_interval` in
    /// leap years, per the protocol constant's own definition.
    pub fn calculate_rewards(
        &self,
        state: &mut State,
        params: &dyn ParamsStore,
        staker: &dyn Staker,
        signer: Address,
        block_time: u64,
    ) -> Result<BigInt, EnergyError> {
        let mut blocks_per_year = state.params().blocks_per_year;
        if is_leap_year(block_time) {
            blocks_per_year = blocks_per_year.saturating_sub(state.params().seeder_interval);
        }
        if blocks_per_year == 0 {
            return Ok(BigInt::zero());
        }
        let (locked_vet, _locked_weight) = staker.locked_stake(signer);
        let curve_factor = params.get(ParamKey::CurveFactor);
        let scaled = isqrt(locked_vet / BigInt::from(WEI_PER_ETHER));
        Ok(curve_factor * scaled * BigInt::from(WEI_PER_ETHER) / BigInt::from(blocks_per_year))
    }

    /// Splits the reward between `beneficiary` and `signer`'s delegators (§4.8 steps
    /// 1-6). A rejected delegator credit fails the whole operation — distinguished from
    /// a legitimately zero reward via [`RewardOutcome::Rejected`] — in which case
    /// nothing at all is credited.
    #[allow(clippy::too_many_arguments)]
    pub fn distribute_rewards(
        &self,
        state: &mut State,
        params: &dyn ParamsStore,
        beneficiary: Address,
        signer: Address,
        staker: &mut dyn Staker,
        current_block: u64,
        block_time: u64,
    ) -> Result<RewardOutcome, EnergyError> {
        let reward = self.calculate_rewards(state, params, staker, signer, block_time)?;
        let has_delegations = staker.has_delegations(signer);

        let (beneficiary_share, delegators_share) = if has_delegations {
            let percentage = params.get(ParamKey::ValidatorRewardPercentage).min(BigInt::from(100u64));
            let beneficiary_share = reward * percentage / BigInt::from(100u64);
            let delegators_share = reward - beneficiary_share;
            (beneficiary_share, delegators_share)
        } else {
            (reward, BigInt::zero())
        };

        if !delegators_share.is_zero() && !staker.increase_delegators_reward(signer, delegators_share, current_block) {
            debug!(?signer, "energy.distribute_rewards: delegator credit rejected");
            return Ok(RewardOutcome::Rejected);
        }

        let current_energy = state.get_energy(beneficiary, block_time)?;
        state.set_energy(beneficiary, current_energy + beneficiary_share, block_time)?;

        let issued = self.load_issued(state)?;
        self.save_issued(state, issued + reward)?;

        Ok(RewardOutcome::Distributed(reward))
    }
}

/// Outcome of [`Energy::distribute_rewards`]: a rejected delegator credit is distinct
/// from a legitimately zero reward, so callers never mistake one for the other.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RewardOutcome {
    Distributed(BigInt),
    Rejected,
}

/// Gregorian leap-year rule applied to the calendar year containing `block_time`
/// (a Unix timestamp in seconds).
fn is_leap_year(block_time: u64) -> bool {
    use chrono::Datelike;
    let year = chrono::DateTime::from_timestamp(block_time as i64, 0)
        .map(|dt| dt.year())
        .unwrap_or(1970);
    (year % 4 == 0 && year % 100 != 0) || year % 400 == 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use thor_kv::{InMemoryStore, Store};
    use thor_state::{CodeCache, ProtocolParams};
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

    struct FakeStaker {
        locked_vet: BigInt,
        has_delegations: bool,
        credited: Vec<(Address, BigInt, u64)>,
    }

    impl Staker for FakeStaker {
        fn locked_stake(&self, _signer: Address) -> (BigInt, BigInt) {
            (self.locked_vet, BigInt::zero())
        }

        fn has_delegations(&self, _signer: Address) -> bool {
            self.has_delegations
        }

        fn increase_delegators_reward(&mut self, signer: Address, reward: BigInt, current_block: u64) -> bool {
            self.credited.push((signer, reward, current_block));
            true
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
                blocks_per_year: 1000,
                seeder_interval: 0,
                validator_reward_percentage_default: 30,
                curve_factor: BigInt::from(1u64),
                max_block_proposers: 0,
            },
            CodeCache::new(16),
        )
    }

    #[test]
    fn set_initial_supply_and_total_supply_grows_with_time() {
        let mut state = fresh_state();
        let energy = Energy::new(Address::repeat_byte(0xEE));
        energy
            .set_initial_supply(&mut state, BigInt::from(1_000_000_000_000u64), BigInt::zero(), 0)
            .unwrap();
        let growth_rate = state.params().growth_rate;
        let at_100 = energy.total_supply(&mut state, 100).unwrap();
        let expected = BigInt::from(100u64) * BigInt::from(1_000_000_000_000u64) * growth_rate / BigInt::from(WEI_PER_ETHER);
        assert!(!expected.is_zero());
        assert_eq!(at_100, expected);

        // Stopping growth before `100` caps it at the stop time instead.
        energy.stop_energy_growth(&mut state, 40).unwrap();
        let expected_at_stop =
            BigInt::from(40u64) * BigInt::from(1_000_000_000_000u64) * growth_rate / BigInt::from(WEI_PER_ETHER);
        assert_eq!(energy.total_supply(&mut state, 100).unwrap(), expected_at_stop);
        // Idempotent: stopping again does not move the recorded stop time.
        energy.stop_energy_growth(&mut state, 9999).unwrap();
        assert_eq!(energy.get_energy_growth_stop_time(&mut state).unwrap(), Some(40));
    }

    #[test]
    fn add_then_sub_round_trips_and_tracks_totals() {
        let mut state = fresh_state();
        let energy = Energy::new(Address::repeat_byte(0xEE));
        let addr = Address::repeat_byte(1);
        energy.add(&mut state, addr, BigInt::from(50u64), 10).unwrap();
        assert_eq!(energy.get(&mut state, addr, 10).unwrap(), BigInt::from(50u64));
        assert!(energy.sub(&mut state, addr, BigInt::from(20u64), 10).unwrap());
        assert_eq!(energy.get(&mut state, addr, 10).unwrap(), BigInt::from(30u64));
        assert!(!energy.sub(&mut state, addr, BigInt::from(1000u64), 10).unwrap());
        assert_eq!(energy.total_burned(&mut state).unwrap(), BigInt::from(20u64));
    }

    #[test]
    fn distribute_rewards_splits_between_beneficiary_and_delegators() {
        let mut state = fresh_state();
        let energy = Energy::new(Address::repeat_byte(0xEE));
        let params = FixedParams {
            curve_factor: BigInt::from(1000u64),
            validator_percentage: BigInt::from(30u64),
        };
        let mut staker = FakeStaker {
            locked_vet: BigInt::from(WEI_PER_ETHER) * BigInt::from(100u64),
            has_delegations: true,
            credited: Vec::new(),
        };
        let beneficiary = Address::repeat_byte(1);
        let signer = Address::repeat_byte(2);

        let reward = match energy
            .distribute_rewards(&mut state, &params, beneficiary, signer, &mut staker, 1, 1)
            .unwrap()
        {
            RewardOutcome::Distributed(reward) => reward,
            RewardOutcome::Rejected => panic!("expected a distributed reward"),
        };
        assert!(!reward.is_zero());
        assert_eq!(staker.credited.len(), 1);
        let (_, delegators_share, _) = staker.credited[0];
        let beneficiary_share = energy.get(&mut state, beneficiary, 1).unwrap();
        assert_eq!(beneficiary_share + delegators_share, reward);
        assert_eq!(energy.load_issued(&mut state).unwrap(), reward);
    }

    #[test]
    fn distribute_rewards_clamps_percentage_over_100_to_full_beneficiary_share() {
        let mut state = fresh_state();
        let energy = Energy::new(Address::repeat_byte(0xEE));
        let params = FixedParams {
            curve_factor: BigInt::from(1000u64),
            validator_percentage: BigInt::from(200u64),
        };
        let mut staker = FakeStaker {
            locked_vet: BigInt::from(WEI_PER_ETHER) * BigInt::from(100u64),
            has_delegations: true,
            credited: Vec::new(),
        };
        let beneficiary = Address::repeat_byte(1);
        let signer = Address::repeat_byte(2);

        let reward = match energy
            .distribute_rewards(&mut state, &params, beneficiary, signer, &mut staker, 1, 1)
            .unwrap()
        {
            RewardOutcome::Distributed(reward) => reward,
            RewardOutcome::Rejected => panic!("expected a distributed reward"),
        };
        assert!(staker.credited.is_empty());
        assert_eq!(energy.get(&mut state, beneficiary, 1).unwrap(), reward);
    }

    fn fresh_state_with_seeder_interval(seeder_interval: u64) -> State {
        let store: Arc<dyn Store> = Arc::new(InMemoryStore::new());
        State::state_at(
            store,
            *EMPTY_TRIE_HASH,
            0,
            ProtocolParams {
                growth_rate: BigInt::from(1_000_000_000u64),
                blocks_per_year: 1000,
                seeder_interval,
                validator_reward_percentage_default: 30,
                curve_factor: BigInt::from(1u64),
                max_block_proposers: 0,
            },
            CodeCache::new(16),
        )
    }

    #[test]
    fn calculate_rewards_reduces_blocks_per_year_by_seeder_interval_in_leap_years() {
        let mut leap_state = fresh_state_with_seeder_interval(100);
        let mut common_state = fresh_state_with_seeder_interval(100);

        let energy = Energy::new(Address::repeat_byte(0xEE));
        let params = FixedParams { curve_factor: BigInt::from(1000u64), validator_percentage: BigInt::from(30u64) };
        let staker = FakeStaker {
            locked_vet: BigInt::from(WEI_PER_ETHER) * BigInt::from(100u64),
            has_delegations: false,
            credited: Vec::new(),
        };
        let signer = Address::repeat_byte(2);

        // 2024-03-01T00:00:00Z is a leap year; 2023-03-01T00:00:00Z is not.
        let leap_block_time = 1_709_251_200u64;
        let common_block_time = 1_677_628_800u64;

        let leap_reward =
            energy.calculate_rewards(&mut leap_state, &params, &staker, signer, leap_block_time).unwrap();
        let common_reward =
            energy.calculate_rewards(&mut common_state, &params, &staker, signer, common_block_time).unwrap();

        assert!(leap_reward > common_reward);
    }
}
