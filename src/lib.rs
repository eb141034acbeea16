//! handbench: endurance and stress testing for CAN-connected dexterous hands
//!
//! The crate drives many hands at once through repeated rounds of a test
//! program (aging, gesture stress, motor current), verifies finger positions
//! and motor currents, quarantines units that stop responding and produces a
//! campaign report.
//!
//! `api` describes the device surface, `protocol` the CAN transport below it,
//! `core` the test engine and `programs` the built-in test programs. The
//! command line front end and logger setup are kept in hidden modules.

pub mod api;
#[doc(hidden)]
pub mod boot;
#[doc(hidden)]
pub mod cli;
pub mod core;
pub mod programs;
pub mod protocol;

pub use api::*;
