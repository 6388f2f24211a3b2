//! Validation suites for the flash simulator.
//!
//! Provides a reusable rig that wires a configuration into an FTL and a
//! controller, keeps a shadow model of expected contents, and cross-checks
//! the FTL's invariants after every host operation. The test suites cover
//! the concrete scenarios of the simulator contract, long-running endurance
//! workloads, and property-based exploration.

pub mod harness;


#[cfg(test)]
mod endurance_tests;

#[cfg(test)]
mod proptest_ftl;

pub use harness::SimRig;
