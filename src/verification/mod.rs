/// Verification-code engine
///
/// Issues and validates single-use, time-boxed numeric codes bound to an
/// email or phone identifier, with a per-identifier issuance cooldown.

mod engine;

pub use engine::CodeEngine;
