//! Timer counter unit (TCU) register module.
//!
//! The TCU has eight channels. Enable, stop, flag and mask state of all channels lives in
//! shared registers with dedicated set and clear registers, so a channel can change its own
//! bits with a single write. Bit `n` of the flag and mask registers is the full match of
//! channel `n`, bit `n + 16` the half match.
//!
//! Channels 0, 3, 4 and 5 additionally have a 16 entry FIFO which feeds (duty, period) pairs
//! into the compare registers.
use arbitrary_int::u5;

pub const TCU_BASE_ADDR: usize = 0x1000_2000;
pub const NUM_CHANNELS: usize = 8;
pub const CHANNEL_OFFSET: usize = 0x40;
pub const CHANNEL_STRIDE: usize = 0x10;
pub const FIFO_OFFSET: usize = 0x200;
pub const FIFO_STRIDE: usize = 0x10;
/// Number of entries of a channel FIFO.
pub const FIFO_DEPTH: usize = 16;

/// Base address of the compare/counter/control block of a channel.
pub const fn channel_base_addr(channel: usize) -> Option<usize> {
    if channel >= NUM_CHANNELS {
        return None;
    }
    Some(TCU_BASE_ADDR + CHANNEL_OFFSET + channel * CHANNEL_STRIDE)
}

/// Base address of the FIFO block of a channel. Only channels 0, 3, 4 and 5 have one.
pub const fn fifo_base_addr(channel: usize) -> Option<usize> {
    match channel {
        0 | 3 | 4 | 5 => Some(TCU_BASE_ADDR + FIFO_OFFSET + channel * FIFO_STRIDE),
        _ => None,
    }
}

#[bitbybit::bitenum(u3, exhaustive = true)]
#[derive(Debug, PartialEq, Eq)]
pub enum Prescale {
    Div1 = 0b000,
    Div4 = 0b001,
    Div16 = 0b010,
    Div64 = 0b011,
    Div256 = 0b100,
    Div1024 = 0b101,
    Reserved0 = 0b110,
    Reserved1 = 0b111,
}

#[bitbybit::bitfield(u32, default = 0x0)]
#[derive(Debug, PartialEq, Eq)]
pub struct ChannelControl {
    /// When set, disabling the PWM output stops the waveform immediately. Otherwise the
    /// current period finishes first.
    #[bit(9, rw)]
    abrupt_shutdown: bool,
    /// Output level while the counter is below the half compare value.
    #[bit(8, rw)]
    initial_level_high: bool,
    #[bit(7, rw)]
    pwm_enable: bool,
    #[bit(6, rw)]
    pwm_input_enable: bool,
    #[bits(3..=5, rw)]
    prescale: Prescale,
    #[bit(2, rw)]
    ext_enable: bool,
    #[bit(1, rw)]
    rtc_enable: bool,
    #[bit(0, rw)]
    pclk_enable: bool,
}

#[bitbybit::bitenum(u2, exhaustive = true)]
#[derive(Debug, PartialEq, Eq)]
pub enum FifoMode {
    NonFifo = 0b00,
    /// Play the FIFO content once.
    Mode1 = 0b01,
    /// Replay the FIFO content for the programmed number of cycles.
    Mode2 = 0b10,
    Reserved = 0b11,
}

#[bitbybit::bitfield(u32, default = 0x0)]
#[derive(Debug, PartialEq, Eq)]
pub struct FifoControl {
    /// Number of valid FIFO entries.
    #[bits(8..=12, rw)]
    depth: u5,
    /// Flush the FIFO. Self-clearing.
    #[bit(2, rw)]
    clear: bool,
    #[bits(0..=1, rw)]
    mode: FifoMode,
}

#[bitbybit::bitfield(u32)]
#[derive(Debug)]
pub struct FifoStatus {
    #[bits(0..=4, r)]
    level: u5,
}

/// Shared enable, stop, flag and mask registers.
#[derive(derive_mmio::Mmio)]
#[repr(C)]
pub struct Registers {
    _reserved_0: [u32; 4],
    #[mmio(PureRead)]
    enabled: u32,
    #[mmio(Write)]
    enable_set: u32,
    #[mmio(Write)]
    enable_clear: u32,
    /// A set bit gates the channel clock.
    #[mmio(PureRead)]
    stopped: u32,
    #[mmio(PureRead)]
    flags: u32,
    #[mmio(Write)]
    flags_set: u32,
    #[mmio(Write)]
    flags_clear: u32,
    #[mmio(Write)]
    stop_set: u32,
    #[mmio(PureRead)]
    irq_mask: u32,
    #[mmio(Write)]
    irq_mask_set: u32,
    #[mmio(Write)]
    irq_mask_clear: u32,
    #[mmio(Write)]
    stop_clear: u32,
}

static_assertions::const_assert_eq!(core::mem::size_of::<Registers>(), CHANNEL_OFFSET);

/// Compare, counter and control registers of one channel.
#[derive(derive_mmio::Mmio)]
#[repr(C)]
pub struct ChannelRegisters {
    /// Full compare value (period).
    full: u32,
    /// Half compare value (duty).
    half: u32,
    counter: u32,
    control: ChannelControl,
}

static_assertions::const_assert_eq!(core::mem::size_of::<ChannelRegisters>(), CHANNEL_STRIDE);

/// FIFO registers of a FIFO capable channel.
#[derive(derive_mmio::Mmio)]
#[repr(C)]
pub struct FifoRegisters {
    control: FifoControl,
    /// Number of replays in [FifoMode::Mode2].
    cycles: u32,
    /// Push port. Each write appends `period << 16 | duty`.
    #[mmio(Write)]
    data: u32,
    #[mmio(PureRead)]
    status: FifoStatus,
}

static_assertions::const_assert_eq!(core::mem::size_of::<FifoRegisters>(), FIFO_STRIDE);

impl Registers {
    /// Create a new TCU MMIO instance at the fixed address [TCU_BASE_ADDR].
    ///
    /// # Safety
    ///
    /// This API can be used to potentially create a driver to the same peripheral structure
    /// from multiple threads. The user must ensure that concurrent accesses are safe and do not
    /// interfere with each other.
    pub const unsafe fn new_mmio_fixed() -> MmioRegisters<'static> {
        unsafe { Self::new_mmio_at(TCU_BASE_ADDR) }
    }
}
