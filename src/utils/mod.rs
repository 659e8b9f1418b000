//! Utility functions for the curvestream listener.

mod conversion;

pub use conversion::{decimal_from_wei, hex_encode, to_wei, WEI_DECIMALS};
