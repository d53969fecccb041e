use thor_common::BigInt;

/// Protocol constants the state engine needs but does not itself source from a
/// config file or environment: the embedding node hands them in once, at `State`
/// construction, the way the teacher's executor is handed a `ChainConfig`/`Genesis`
/// rather than reading network parameters ambiently.
#[derive(Debug, Clone)]
pub struct ProtocolParams {
    /// Wei of energy accrued per wei of balance per second, normalized by `1e18`.
    pub growth_rate: BigInt,
    pub blocks_per_year: u64,
    pub seeder_interval: u64,
    pub validator_reward_percentage_default: u64,
    pub curve_factor: BigInt,
    pub max_block_proposers: u64,
}

/// Closed key set for the external parameters contract (§6): a sum type rather than a
/// string key, so a typo in a key name is a compile error instead of a silent `None`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParamKey {
    ValidatorRewardPercentage,
    DelegatorContractAddress,
    CurveFactor,
    MaxBlockProposers,
}

/// External on-chain parameters store, consumed but not implemented by this crate.
pub trait ParamsStore {
    fn get(&self, key: ParamKey) -> BigInt;
}
