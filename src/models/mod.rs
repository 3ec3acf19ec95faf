//! Built-in product families.
//!
//! New product lines are added here as data: a [`Signature`] listing the
//! model codes and the light types they support, appended to a family.
//!
//! [`Signature`]: crate::model::Signature

pub mod ble;
pub mod net;

use crate::model::ModelFamily;

/// Every built-in family, in match priority order
pub static FAMILIES: [&ModelFamily; 2] = [&net::SP5XXE, &ble::SP6XXE];
