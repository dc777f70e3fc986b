//! Test module for chrome-logger
//!
//! Scenario tests for the request pipeline and property-based tests using
//! proptest for de-duplication, the deferral latch, cycle safety and
//! severity normalization.


#[cfg(test)]
pub mod context_tests;
