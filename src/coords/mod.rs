//! # Coordinate Module
//!
//! Conversion between degrees-minutes-seconds strings and decimal degrees.
//!
//! This module handles:
//! - Parsing DMS strings such as `6°10'31.36"S`
//! - Validating DMS and decimal input
//! - Converting in both directions

pub mod dms;

pub use dms::{
    parse, to_decimal, to_dms, validate_decimal, validate_dms, CoordinateError, DmsComponents,
    Hemisphere,
};
