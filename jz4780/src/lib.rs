//! # Rust peripheral access crate for the Ingenic JZ4780 SoC family
//!
//! This crate covers the register maps of the GPIO controller (six ports plus the GPIOZ
//! broadcast block), the three MMC/SD controllers (MSC) and the timer counter unit (TCU).
//! The register blocks are defined with [derive_mmio], the register contents with
//! [bitbybit] bitfields.
//!
//! The base addresses defined here are the only valid addresses for the respective
//! peripheral blocks.
#![no_std]
#![cfg_attr(docsrs, feature(doc_auto_cfg))]

pub mod gpio;
pub mod msc;
pub mod tcu;

#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
#[error("address {0:#010x} is not a valid peripheral base address")]
pub struct InvalidBaseAddress(pub usize);
