// 10.0 config.rs: per-market settings in one place. impact, fees, reserve, accrual, collateral.
// 10.1 presets and validation at the bottom. everything is serde so configs can ship as json.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::types::Side;

// imbalance-based impact curve: factor * imbalance^exponent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImpactParams {
    // Applied when the delta reduces the imbalance
    pub positive_factor: Decimal,
    // Applied when the delta grows the imbalance
    pub negative_factor: Decimal,
    pub exponent: Decimal,
}

impl ImpactParams {
    pub fn disabled() -> Self {
        Self {
            positive_factor: Decimal::ZERO,
            negative_factor: Decimal::ZERO,
            exponent: Decimal::ONE,
        }
    }
}

impl Default for ImpactParams {
    fn default() -> Self {
        Self {
            positive_factor: dec!(0.000000005),
            negative_factor: dec!(0.00000001),
            exponent: dec!(2),
        }
    }
}

/** 10.2: fee settings. all factors are fractions, 0.001 = 0.1% */
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeeParams {
    pub deposit_fee_factor_positive_impact: Decimal,
    pub deposit_fee_factor_negative_impact: Decimal,
    pub withdrawal_fee_factor: Decimal,
    pub position_fee_factor_positive_impact: Decimal,
    pub position_fee_factor_negative_impact: Decimal,
    // Share of protocol fees routed to the fee receiver, the rest stays in the pool
    pub fee_receiver_factor: Decimal,
    // Share of borrowing fees routed to the fee receiver
    pub borrowing_fee_receiver_factor: Decimal,
}

impl FeeParams {
    pub fn zero() -> Self {
        Self {
            deposit_fee_factor_positive_impact: Decimal::ZERO,
            deposit_fee_factor_negative_impact: Decimal::ZERO,
            withdrawal_fee_factor: Decimal::ZERO,
            position_fee_factor_positive_impact: Decimal::ZERO,
            position_fee_factor_negative_impact: Decimal::ZERO,
            fee_receiver_factor: Decimal::ZERO,
            borrowing_fee_receiver_factor: Decimal::ZERO,
        }
    }
}

impl Default for FeeParams {
    fn default() -> Self {
        Self {
            deposit_fee_factor_positive_impact: dec!(0.0005),
            deposit_fee_factor_negative_impact: dec!(0.0007),
            withdrawal_fee_factor: dec!(0.0005),
            position_fee_factor_positive_impact: dec!(0.0005),
            position_fee_factor_negative_impact: dec!(0.0007),
            fee_receiver_factor: dec!(0.37),
            borrowing_fee_receiver_factor: dec!(0.37),
        }
    }
}

// how much of a side's pool value open interest may reserve
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReserveParams {
    pub long_reserve_factor: Decimal,
    pub short_reserve_factor: Decimal,
}

impl ReserveParams {
    pub fn factor(&self, side: Side) -> Decimal {
        match side {
            Side::Long => self.long_reserve_factor,
            Side::Short => self.short_reserve_factor,
        }
    }
}

impl Default for ReserveParams {
    fn default() -> Self {
        Self {
            long_reserve_factor: dec!(0.8),
            short_reserve_factor: dec!(0.8),
        }
    }
}

// per-block rates consumed by the default accrual policy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccrualParams {
    pub long_borrowing_factor: Decimal,
    pub short_borrowing_factor: Decimal,
    pub borrowing_exponent: Decimal,
    pub funding_factor: Decimal,
    pub funding_exponent: Decimal,
}

impl AccrualParams {
    pub fn disabled() -> Self {
        Self {
            long_borrowing_factor: Decimal::ZERO,
            short_borrowing_factor: Decimal::ZERO,
            borrowing_exponent: Decimal::ONE,
            funding_factor: Decimal::ZERO,
            funding_exponent: Decimal::ONE,
        }
    }

    pub fn borrowing_factor(&self, side: Side) -> Decimal {
        match side {
            Side::Long => self.long_borrowing_factor,
            Side::Short => self.short_borrowing_factor,
        }
    }
}

impl Default for AccrualParams {
    fn default() -> Self {
        Self {
            long_borrowing_factor: dec!(0.00000001),
            short_borrowing_factor: dec!(0.00000001),
            borrowing_exponent: Decimal::ONE,
            funding_factor: dec!(0.00000002),
            funding_exponent: Decimal::ONE,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollateralParams {
    // collateral usd / size usd must stay at or above this (0.01 = 100x max leverage)
    pub min_collateral_factor: Decimal,
    pub min_collateral_usd: Decimal,
}

impl Default for CollateralParams {
    fn default() -> Self {
        Self {
            min_collateral_factor: dec!(0.01),
            min_collateral_usd: dec!(1),
        }
    }
}

// which oracle feed prices the index asset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriceSource {
    #[default]
    Primary,
    Custom,
}

// Complete configuration for one market
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketConfig {
    pub swap_impact: ImpactParams,
    pub position_impact: ImpactParams,
    pub fees: FeeParams,
    pub reserve: ReserveParams,
    pub accrual: AccrualParams,
    pub collateral: CollateralParams,
    pub index_price_source: PriceSource,
}

impl Default for MarketConfig {
    fn default() -> Self {
        Self {
            swap_impact: ImpactParams::default(),
            position_impact: ImpactParams::default(),
            fees: FeeParams::default(),
            reserve: ReserveParams::default(),
            accrual: AccrualParams::default(),
            collateral: CollateralParams::default(),
            index_price_source: PriceSource::Primary,
        }
    }
}

impl MarketConfig {
    // no fees, no impact, no accrual. pure share and position arithmetic.
    pub fn zero_fee() -> Self {
        Self {
            swap_impact: ImpactParams::disabled(),
            position_impact: ImpactParams::disabled(),
            fees: FeeParams::zero(),
            accrual: AccrualParams::disabled(),
            ..Self::default()
        }
    }

    // tighter reserve and leverage for thin pools
    pub fn conservative() -> Self {
        let mut config = Self::default();
        config.reserve.long_reserve_factor = dec!(0.5);
        config.reserve.short_reserve_factor = dec!(0.5);
        config.collateral.min_collateral_factor = dec!(0.05); // 20x max
        config.collateral.min_collateral_usd = dec!(10);
        config.swap_impact.negative_factor = dec!(0.00000002);
        config.position_impact.negative_factor = dec!(0.00000002);
        config
    }

    // Validate the configuration for internal consistency
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, impact) in [("swap", &self.swap_impact), ("position", &self.position_impact)] {
            if impact.positive_factor < Decimal::ZERO || impact.negative_factor < Decimal::ZERO {
                return Err(ConfigError::InvalidImpact {
                    reason: format!("{name} impact factors must be non-negative"),
                });
            }
            if impact.exponent < Decimal::ONE {
                return Err(ConfigError::InvalidImpact {
                    reason: format!("{name} impact exponent must be at least 1"),
                });
            }
            // a positive factor above the negative one would let round trips farm the impact pool
            if impact.positive_factor > impact.negative_factor {
                return Err(ConfigError::InvalidImpact {
                    reason: format!("{name} positive impact factor exceeds negative factor"),
                });
            }
        }

        let fee_factors = [
            self.fees.deposit_fee_factor_positive_impact,
            self.fees.deposit_fee_factor_negative_impact,
            self.fees.withdrawal_fee_factor,
            self.fees.position_fee_factor_positive_impact,
            self.fees.position_fee_factor_negative_impact,
            self.fees.fee_receiver_factor,
            self.fees.borrowing_fee_receiver_factor,
        ];
        if fee_factors.iter().any(|f| *f < Decimal::ZERO || *f > Decimal::ONE) {
            return Err(ConfigError::InvalidFees {
                reason: "fee factors must be within [0, 1]".to_string(),
            });
        }

        for side in Side::ALL {
            if self.reserve.factor(side) <= Decimal::ZERO {
                return Err(ConfigError::InvalidReserve {
                    reason: format!("{side} reserve factor must be positive"),
                });
            }
        }

        let accrual = &self.accrual;
        if accrual.long_borrowing_factor < Decimal::ZERO
            || accrual.short_borrowing_factor < Decimal::ZERO
            || accrual.funding_factor < Decimal::ZERO
        {
            return Err(ConfigError::InvalidAccrual {
                reason: "accrual rates must be non-negative".to_string(),
            });
        }
        if accrual.borrowing_exponent < Decimal::ONE || accrual.funding_exponent < Decimal::ONE {
            return Err(ConfigError::InvalidAccrual {
                reason: "accrual exponents must be at least 1".to_string(),
            });
        }

        if self.collateral.min_collateral_factor < Decimal::ZERO
            || self.collateral.min_collateral_factor >= Decimal::ONE
            || self.collateral.min_collateral_usd < Decimal::ZERO
        {
            return Err(ConfigError::InvalidCollateral {
                reason: "min collateral factor must be in [0, 1) and min usd non-negative".to_string(),
            });
        }

        Ok(())
    }

    pub fn max_leverage(&self) -> Option<Decimal> {
        if self.collateral.min_collateral_factor.is_zero() {
            None
        } else {
            Some(Decimal::ONE / self.collateral.min_collateral_factor)
        }
    }
}

// Configuration validation errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid impact config: {reason}")]
    InvalidImpact { reason: String },
    #[error("Invalid fee config: {reason}")]
    InvalidFees { reason: String },
    #[error("Invalid reserve config: {reason}")]
    InvalidReserve { reason: String },
    #[error("Invalid accrual config: {reason}")]
    InvalidAccrual { reason: String },
    #[error("Invalid collateral config: {reason}")]
    InvalidCollateral { reason: String },
}

// Environment presets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Environment {
    Development,
    Testnet,
    Mainnet,
}

impl Environment {
    pub fn config(&self) -> MarketConfig {
        match self {
            Environment::Development => MarketConfig::zero_fee(),
            Environment::Testnet => MarketConfig::default(),
            Environment::Mainnet => MarketConfig::conservative(),
        }
    }
}
