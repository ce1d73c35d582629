//! # GPIO register module.
//!
//! The controller has six ports (A to F) with identical register blocks at a fixed stride.
//! Each pin function is encoded by four one-bit-per-pin latches: interrupt, mask, pattern 1
//! and pattern 0. Every latch has a set and a clear register next to it.
//!
//! The GPIOZ block uses the same layout at an alias address. Its set and clear registers
//! do not touch any real port. They stage values, and a write of a port's group id to the
//! group-load register commits the staged bits into that port's latches. There is only one
//! staging register set for all six ports.

pub const GPIO_BASE_ADDR: usize = 0x1001_0000;
pub const PORT_STRIDE: usize = 0x100;
pub const NUM_PORTS: usize = 6;
pub const PINS_PER_PORT: usize = 32;

/// Alias address of the broadcast configuration block.
pub const GPIOZ_BASE_ADDR: usize = GPIO_BASE_ADDR + 7 * PORT_STRIDE;

/// Base address of the port with the given ordinal (A = 0).
///
/// Returns [None] for ordinals larger than 5.
pub const fn port_base_addr(ordinal: usize) -> Option<usize> {
    if ordinal >= NUM_PORTS {
        return None;
    }
    Some(GPIO_BASE_ADDR + ordinal * PORT_STRIDE)
}

/// Group id encoded in a GPIO block address.
#[inline]
pub const fn group_id_of(base_addr: usize) -> u8 {
    ((base_addr >> 8) & 0xF) as u8
}

#[derive(derive_mmio::Mmio)]
#[repr(C)]
pub struct Registers {
    /// Pin level
    #[mmio(PureRead)]
    pin: u32,
    _reserved_0: [u32; 3],
    /// Interrupt latch
    #[mmio(PureRead)]
    int: u32,
    #[mmio(Write)]
    int_set: u32,
    #[mmio(Write)]
    int_clear: u32,
    _reserved_1: u32,
    /// Interrupt mask latch. A set bit lets the pin interrupt through.
    #[mmio(PureRead)]
    mask: u32,
    #[mmio(Write)]
    mask_set: u32,
    #[mmio(Write)]
    mask_clear: u32,
    _reserved_2: u32,
    /// Pattern 1 latch
    #[mmio(PureRead)]
    pat1: u32,
    #[mmio(Write)]
    pat1_set: u32,
    #[mmio(Write)]
    pat1_clear: u32,
    _reserved_3: u32,
    /// Pattern 0 latch
    #[mmio(PureRead)]
    pat0: u32,
    #[mmio(Write)]
    pat0_set: u32,
    #[mmio(Write)]
    pat0_clear: u32,
    _reserved_4: u32,
    /// Interrupt flag
    #[mmio(PureRead)]
    flag: u32,
    _reserved_5: u32,
    #[mmio(Write)]
    flag_clear: u32,
    _reserved_6: [u32; 5],
    /// Pull disable latch. A set bit disconnects the pull resistor.
    #[mmio(PureRead)]
    pull_disable: u32,
    #[mmio(Write)]
    pull_disable_set: u32,
    #[mmio(Write)]
    pull_disable_clear: u32,
    _reserved_7: [u32; 29],
    /// Group load. Only implemented by the GPIOZ block.
    #[mmio(Write)]
    gid2ld: u32,
    _reserved_8: [u32; 3],
}

static_assertions::const_assert_eq!(core::mem::size_of::<Registers>(), PORT_STRIDE);
static_assertions::const_assert_eq!(core::mem::offset_of!(Registers, int), 0x10);
static_assertions::const_assert_eq!(core::mem::offset_of!(Registers, mask), 0x20);
static_assertions::const_assert_eq!(core::mem::offset_of!(Registers, pat1), 0x30);
static_assertions::const_assert_eq!(core::mem::offset_of!(Registers, pat0), 0x40);
static_assertions::const_assert_eq!(core::mem::offset_of!(Registers, flag_clear), 0x58);
static_assertions::const_assert_eq!(core::mem::offset_of!(Registers, pull_disable), 0x70);
static_assertions::const_assert_eq!(core::mem::offset_of!(Registers, gid2ld), 0xF0);

impl Registers {
    /// Create a new MMIO instance for the GPIO port with the given ordinal (A = 0).
    ///
    /// Returns [None] for ordinals larger than 5.
    ///
    /// # Safety
    ///
    /// This API can be used to potentially create a driver to the same peripheral structure
    /// from multiple threads. The user must ensure that concurrent accesses are safe and do not
    /// interfere with each other.
    pub const unsafe fn new_mmio_port(ordinal: usize) -> Option<MmioRegisters<'static>> {
        match port_base_addr(ordinal) {
            Some(addr) => Some(unsafe { Self::new_mmio_at(addr) }),
            None => None,
        }
    }

    /// Create a new MMIO instance for the GPIOZ broadcast block at [GPIOZ_BASE_ADDR].
    ///
    /// # Safety
    ///
    /// GPIOZ is shared by all six ports. Handles must only be used while holding the lock
    /// which serializes pin function programming.
    pub const unsafe fn new_mmio_gpioz() -> MmioRegisters<'static> {
        unsafe { Self::new_mmio_at(GPIOZ_BASE_ADDR) }
    }
}
