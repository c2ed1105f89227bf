//! H6 — Profile activator (two-phase pre-flight/apply) and H8 — profile
//! auto-load on recognized client handshake (spec §4.1, §8 scenario 5).

pub mod activator;
pub mod autoload;

pub use activator::{PreflightFailure, PreflightReport, ProfileActivator};
pub use autoload::ProfileAutoLoader;
