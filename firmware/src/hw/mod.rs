//! STM32G0 adapters for the calibration core.
//!
//! Embassy has no driver for HSI trimming or timer input capture on an LSE
//! source, so these adapters program the few fields involved through the
//! typed PAC registers. Peripherals are still claimed through embassy's
//! `Peri` tokens so nothing else can take them.

#![cfg(target_os = "none")]

pub mod capture;
pub mod hsi;
