//! Numeric conversion utilities.
//!
//! All monetary values cross the decode boundary exactly once: raw wei
//! integers (`U256`) become 18-digit `BigDecimal`s here and stay decimal
//! for the rest of the pipeline.

use alloy::primitives::{hex, U256};
use bigdecimal::{rounding::RoundingMode, BigDecimal};
use num_bigint::{BigInt, Sign};
use once_cell::sync::Lazy;

/// Fractional digits of the native chain denomination.
pub const WEI_DECIMALS: u8 = 18;

// ============================================
// Hex Encoding
// ============================================

/// Encode bytes as a lowercase hex string with 0x prefix.
pub fn hex_encode(bytes: &[u8]) -> String {
    format!("0x{}", hex::encode(bytes))
}

// ============================================
// Wei Conversions
// ============================================

/// Convert a raw wei amount into an 18-digit decimal.
///
/// Goes through `BigInt` bytes rather than string parsing, which keeps
/// full precision for values beyond u128.
pub fn decimal_from_wei(value: U256) -> BigDecimal {
    let bytes: [u8; 32] = value.to_le_bytes();
    let big_int = BigInt::from_bytes_le(Sign::Plus, &bytes);
    BigDecimal::from(big_int) / wei_factor()
}

/// Convert an 18-digit decimal back into wei, rounding half-up.
///
/// Negative inputs saturate at zero; wei amounts are unsigned.
pub fn to_wei(value: &BigDecimal) -> U256 {
    let scaled = (value * wei_factor()).with_scale_round(0, RoundingMode::HalfUp);
    let (int, _) = scaled.as_bigint_and_exponent();
    let (sign, bytes) = int.to_bytes_le();
    if sign == Sign::Minus || bytes.len() > 32 {
        return U256::ZERO;
    }
    let mut buf = [0u8; 32];
    buf[..bytes.len()].copy_from_slice(&bytes);
    U256::from_le_bytes(buf)
}

/// 10^18 as BigDecimal (cached).
fn wei_factor() -> BigDecimal {
    static FACTOR: Lazy<BigDecimal> =
        Lazy::new(|| BigDecimal::from(BigInt::from(10u32).pow(WEI_DECIMALS as u32)));
    FACTOR.clone()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn wei_round_trip_preserves_18_digit_decimals() {
        for s in [
            "0",
            "1",
            "0.000000000000000001",
            "0.01",
            "2",
            "123456.789012345678901234",
        ] {
            let d = BigDecimal::from_str(s).unwrap();
            assert_eq!(decimal_from_wei(to_wei(&d)), d.with_scale(18));
        }
    }

    #[test]
    fn one_ether_in_wei() {
        let one = BigDecimal::from(1);
        assert_eq!(to_wei(&one), U256::from(10u128.pow(18)));
        assert_eq!(decimal_from_wei(U256::from(10u128.pow(18))), one.with_scale(18));
    }

    #[test]
    fn to_wei_rounds_half_up() {
        // 1.5e-18 ether rounds up to 2 wei
        let d = BigDecimal::from_str("0.0000000000000000015").unwrap();
        assert_eq!(to_wei(&d), U256::from(2u8));
    }

    #[test]
    fn negative_amounts_saturate_at_zero() {
        let d = BigDecimal::from_str("-1").unwrap();
        assert_eq!(to_wei(&d), U256::ZERO);
    }

    #[test]
    fn large_values_survive_the_bigint_route() {
        // Larger than u128 in wei
        let d = BigDecimal::from_str("400000000000000000000000").unwrap();
        assert_eq!(decimal_from_wei(to_wei(&d)), d.with_scale(18));
    }

    #[test]
    fn hex_encode_is_prefixed_lowercase() {
        assert_eq!(hex_encode(&[0xAB, 0xCD]), "0xabcd");
    }
}
