//! Low-level GPIO access module.
//!
//! [GpioRegisterPort] is the symbolic register interface of a GPIO port or of the GPIOZ
//! broadcast block. It is implemented for the MMIO handle of the PAC.
use jz4780::gpio::MmioRegisters;

use crate::RegisterPort;

/// One of the four per-pin configuration latches.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[repr(u8)]
pub enum Latch {
    Interrupt = 0,
    Mask = 1,
    Pattern1 = 2,
    Pattern0 = 3,
}

impl Latch {
    /// Order in which the latches are staged when programming a pin function.
    pub const ALL: [Latch; 4] = [
        Latch::Interrupt,
        Latch::Mask,
        Latch::Pattern1,
        Latch::Pattern0,
    ];

    #[inline]
    pub const fn index(self) -> usize {
        self as usize
    }
}

/// Register access of a GPIO port or of the GPIOZ block.
///
/// All bitmask arguments carry one bit per pin. The set and clear operations only affect the
/// bits which are set in the argument.
pub trait GpioRegisterPort: RegisterPort {
    /// Current input level of all pins.
    fn pin_levels(&mut self) -> u32;

    fn latch(&mut self, latch: Latch) -> u32;

    fn set_latch_bits(&mut self, latch: Latch, bits: u32);

    fn clear_latch_bits(&mut self, latch: Latch, bits: u32);

    fn flags(&mut self) -> u32;

    fn clear_flags(&mut self, bits: u32);

    fn pull_disabled(&mut self) -> u32;

    fn set_pull_disable_bits(&mut self, bits: u32);

    fn clear_pull_disable_bits(&mut self, bits: u32);

    /// Commit the staged latch values into the port with the given group id.
    ///
    /// Only meaningful on the GPIOZ block.
    fn load_group(&mut self, group_id: u8);
}

impl RegisterPort for MmioRegisters<'static> {
    #[inline]
    fn base_addr(&self) -> usize {
        unsafe { self.ptr() as usize }
    }
}

impl GpioRegisterPort for MmioRegisters<'static> {
    #[inline]
    fn pin_levels(&mut self) -> u32 {
        self.read_pin()
    }

    #[inline]
    fn latch(&mut self, latch: Latch) -> u32 {
        match latch {
            Latch::Interrupt => self.read_int(),
            Latch::Mask => self.read_mask(),
            Latch::Pattern1 => self.read_pat1(),
            Latch::Pattern0 => self.read_pat0(),
        }
    }

    #[inline]
    fn set_latch_bits(&mut self, latch: Latch, bits: u32) {
        match latch {
            Latch::Interrupt => self.write_int_set(bits),
            Latch::Mask => self.write_mask_set(bits),
            Latch::Pattern1 => self.write_pat1_set(bits),
            Latch::Pattern0 => self.write_pat0_set(bits),
        }
    }

    #[inline]
    fn clear_latch_bits(&mut self, latch: Latch, bits: u32) {
        match latch {
            Latch::Interrupt => self.write_int_clear(bits),
            Latch::Mask => self.write_mask_clear(bits),
            Latch::Pattern1 => self.write_pat1_clear(bits),
            Latch::Pattern0 => self.write_pat0_clear(bits),
        }
    }

    #[inline]
    fn flags(&mut self) -> u32 {
        self.read_flag()
    }

    #[inline]
    fn clear_flags(&mut self, bits: u32) {
        self.write_flag_clear(bits);
    }

    #[inline]
    fn pull_disabled(&mut self) -> u32 {
        self.read_pull_disable()
    }

    #[inline]
    fn set_pull_disable_bits(&mut self, bits: u32) {
        self.write_pull_disable_set(bits);
    }

    #[inline]
    fn clear_pull_disable_bits(&mut self, bits: u32) {
        self.write_pull_disable_clear(bits);
    }

    #[inline]
    fn load_group(&mut self, group_id: u8) {
        self.write_gid2ld(group_id as u32);
    }
}
