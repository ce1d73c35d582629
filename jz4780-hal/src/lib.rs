//! # HAL for the Ingenic JZ4780 SoC family
//!
//! This crate contains the **H**ardware **A**bstraction **L**ayer (HAL) on top of the
//! [peripheral access crate](jz4780). It covers:
//!
//! - [gpio]: the pin function state machine of the six GPIO ports, which is programmed
//!   through the shared GPIOZ broadcast block, plus the [gpio::irq] edge/level interrupt
//!   controller built on top of it.
//! - [pinmux]: pin group muxing for host pin-control frameworks.
//! - [msc]: the interrupt driven command/data engine of the MMC/SD controllers.
//! - [tcu]: timer channels and PWM generation, including the FIFO driven PWM modes.
//!
//! Every driver talks to its peripheral through a [RegisterPort] extension trait. The traits
//! are implemented for the MMIO handles of the PAC, and any other implementation (for example
//! a simulation) can be plugged in instead.
//!
//! Drivers which program hardware configuration verify it by reading the registers back.
//! Verification failures are reported as errors and are never retried.
#![no_std]
#![cfg_attr(docsrs, feature(doc_cfg))]

#[cfg(feature = "alloc")]
extern crate alloc;
#[cfg(test)]
extern crate std;

pub mod gpio;
pub mod log;
pub mod msc;
pub mod pinmux;
pub mod tcu;
pub mod time;

#[cfg(test)]
pub(crate) mod sim;

pub use jz4780 as pac;
pub use jz4780::InvalidBaseAddress;

/// Access to one memory mapped peripheral instance.
///
/// The base address identifies the instance. Drivers check it against the fixed set of
/// valid base addresses of their peripheral and refuse to work with anything else.
pub trait RegisterPort {
    fn base_addr(&self) -> usize;
}
