#![cfg_attr(not(feature = "std"), no_std)]

mod comms;
pub use comms::*;

mod host;
pub use host::*;

pub mod protocol;

pub mod sync;

pub mod transport;

#[cfg(all(test, feature = "std"))]
pub(crate) mod test_util;
