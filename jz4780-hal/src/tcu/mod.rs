//! # Timer counter unit (TCU) driver
//!
//! The TCU has eight 16-bit channels. Enable, clock stop, flag and interrupt mask state of all
//! channels live in shared registers which have dedicated set and clear registers, so every
//! channel handle only ever writes its own bits, and [Tcu::new] hands out one independent
//! [TimerChannel] per channel.
//!
//! PWM generation, including the FIFO modes of channels 0, 3, 4 and 5, is in [pwm].
use jz4780::tcu::{
    CHANNEL_OFFSET, CHANNEL_STRIDE, ChannelControl, ChannelRegisters, FifoControl, FifoRegisters,
    MmioChannelRegisters, MmioFifoRegisters, MmioRegisters, TCU_BASE_ADDR, fifo_base_addr,
};

use crate::{InvalidBaseAddress, RegisterPort};

pub mod pwm;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, num_enum::TryFromPrimitive)]
#[repr(u8)]
pub enum Channel {
    Ch0 = 0,
    Ch1 = 1,
    Ch2 = 2,
    Ch3 = 3,
    Ch4 = 4,
    Ch5 = 5,
    Ch6 = 6,
    Ch7 = 7,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid timer channel selector {0:#04x}")]
pub struct InvalidChannelError(pub u8);

impl Channel {
    pub const ALL: [Channel; 8] = [
        Channel::Ch0,
        Channel::Ch1,
        Channel::Ch2,
        Channel::Ch3,
        Channel::Ch4,
        Channel::Ch5,
        Channel::Ch6,
        Channel::Ch7,
    ];

    pub fn from_raw(raw: u8) -> Result<Self, InvalidChannelError> {
        Self::try_from(raw).map_err(|_| InvalidChannelError(raw))
    }

    /// Channel selected by a one-hot timer mask.
    pub fn from_mask(mask: u8) -> Result<Self, InvalidChannelError> {
        if mask.count_ones() != 1 {
            return Err(InvalidChannelError(mask));
        }
        Self::from_raw(mask.trailing_zeros() as u8)
    }

    /// Bit of this channel in the enable and stop registers.
    #[inline]
    pub const fn mask(self) -> u8 {
        1 << self as u8
    }

    /// Full and half match bits of this channel in the flag and mask registers.
    #[inline]
    pub const fn flag_bits(self) -> u32 {
        (1 << self as u32) | (1 << (self as u32 + 16))
    }

    #[inline]
    pub const fn has_fifo(self) -> bool {
        matches!(
            self,
            Channel::Ch0 | Channel::Ch3 | Channel::Ch4 | Channel::Ch5
        )
    }

    #[inline]
    pub const fn base_addr(self) -> usize {
        TCU_BASE_ADDR + CHANNEL_OFFSET + self as usize * CHANNEL_STRIDE
    }
}

/// Register access of the TCU.
pub trait TcuRegisterPort: RegisterPort {
    /// Another handle to the same register block.
    fn reg_block(&self) -> Self
    where
        Self: Sized;

    fn enabled(&mut self) -> u8;
    fn enable_counters(&mut self, mask: u8);
    fn disable_counters(&mut self, mask: u8);
    /// A set bit gates the clock of the channel.
    fn stopped(&mut self) -> u8;
    fn stop_clocks(&mut self, mask: u8);
    fn start_clocks(&mut self, mask: u8);
    fn flags(&mut self) -> u32;
    fn clear_flags(&mut self, bits: u32);
    fn irq_mask(&mut self) -> u32;
    fn mask_irqs(&mut self, bits: u32);
    fn unmask_irqs(&mut self, bits: u32);

    fn control(&mut self, ch: Channel) -> ChannelControl;
    fn write_control(&mut self, ch: Channel, ctrl: ChannelControl);
    fn full(&mut self, ch: Channel) -> u16;
    fn write_full(&mut self, ch: Channel, value: u16);
    fn write_half(&mut self, ch: Channel, value: u16);
    fn counter(&mut self, ch: Channel) -> u16;
    fn write_counter(&mut self, ch: Channel, value: u16);

    // FIFO access. Only called for channels with [Channel::has_fifo].
    fn fifo_control(&mut self, ch: Channel) -> FifoControl;
    fn write_fifo_control(&mut self, ch: Channel, ctrl: FifoControl);
    fn write_fifo_cycles(&mut self, ch: Channel, cycles: u32);
    fn push_fifo(&mut self, ch: Channel, entry: u32);
    fn fifo_level(&mut self, ch: Channel) -> u8;
}

#[inline]
fn channel_regs(ch: Channel) -> MmioChannelRegisters<'static> {
    unsafe { ChannelRegisters::new_mmio_at(ch.base_addr()) }
}

#[inline]
fn fifo_regs(ch: Channel) -> Option<MmioFifoRegisters<'static>> {
    fifo_base_addr(ch as usize).map(|addr| unsafe { FifoRegisters::new_mmio_at(addr) })
}

impl RegisterPort for MmioRegisters<'static> {
    #[inline]
    fn base_addr(&self) -> usize {
        unsafe { self.ptr() as usize }
    }
}

impl TcuRegisterPort for MmioRegisters<'static> {
    #[inline]
    fn reg_block(&self) -> Self {
        unsafe { self.clone() }
    }

    #[inline]
    fn enabled(&mut self) -> u8 {
        self.read_enabled() as u8
    }

    #[inline]
    fn enable_counters(&mut self, mask: u8) {
        self.write_enable_set(mask as u32);
    }

    #[inline]
    fn disable_counters(&mut self, mask: u8) {
        self.write_enable_clear(mask as u32);
    }

    #[inline]
    fn stopped(&mut self) -> u8 {
        self.read_stopped() as u8
    }

    #[inline]
    fn stop_clocks(&mut self, mask: u8) {
        self.write_stop_set(mask as u32);
    }

    #[inline]
    fn start_clocks(&mut self, mask: u8) {
        self.write_stop_clear(mask as u32);
    }

    #[inline]
    fn flags(&mut self) -> u32 {
        self.read_flags()
    }

    #[inline]
    fn clear_flags(&mut self, bits: u32) {
        self.write_flags_clear(bits);
    }

    #[inline]
    fn irq_mask(&mut self) -> u32 {
        self.read_irq_mask()
    }

    #[inline]
    fn mask_irqs(&mut self, bits: u32) {
        self.write_irq_mask_set(bits);
    }

    #[inline]
    fn unmask_irqs(&mut self, bits: u32) {
        self.write_irq_mask_clear(bits);
    }

    fn control(&mut self, ch: Channel) -> ChannelControl {
        channel_regs(ch).read_control()
    }

    fn write_control(&mut self, ch: Channel, ctrl: ChannelControl) {
        channel_regs(ch).write_control(ctrl);
    }

    fn full(&mut self, ch: Channel) -> u16 {
        channel_regs(ch).read_full() as u16
    }

    fn write_full(&mut self, ch: Channel, value: u16) {
        channel_regs(ch).write_full(value as u32);
    }

    fn write_half(&mut self, ch: Channel, value: u16) {
        channel_regs(ch).write_half(value as u32);
    }

    fn counter(&mut self, ch: Channel) -> u16 {
        channel_regs(ch).read_counter() as u16
    }

    fn write_counter(&mut self, ch: Channel, value: u16) {
        channel_regs(ch).write_counter(value as u32);
    }

    fn fifo_control(&mut self, ch: Channel) -> FifoControl {
        fifo_regs(ch)
            .map(|mut regs| regs.read_control())
            .unwrap_or(FifoControl::new_with_raw_value(0))
    }

    fn write_fifo_control(&mut self, ch: Channel, ctrl: FifoControl) {
        if let Some(mut regs) = fifo_regs(ch) {
            regs.write_control(ctrl);
        }
    }

    fn write_fifo_cycles(&mut self, ch: Channel, cycles: u32) {
        if let Some(mut regs) = fifo_regs(ch) {
            regs.write_cycles(cycles);
        }
    }

    fn push_fifo(&mut self, ch: Channel, entry: u32) {
        if let Some(mut regs) = fifo_regs(ch) {
            regs.write_data(entry);
        }
    }

    fn fifo_level(&mut self, ch: Channel) -> u8 {
        fifo_regs(ch)
            .map(|mut regs| regs.read_status().level().value())
            .unwrap_or(0)
    }
}

/// The eight channels of the TCU.
pub struct Tcu<P> {
    pub ch0: TimerChannel<P>,
    pub ch1: TimerChannel<P>,
    pub ch2: TimerChannel<P>,
    pub ch3: TimerChannel<P>,
    pub ch4: TimerChannel<P>,
    pub ch5: TimerChannel<P>,
    pub ch6: TimerChannel<P>,
    pub ch7: TimerChannel<P>,
}

impl<P: TcuRegisterPort> Tcu<P> {
    /// Split the TCU into its channels.
    ///
    /// Returns [InvalidBaseAddress] if the register block is not located at [TCU_BASE_ADDR].
    pub fn new(regs: P) -> Result<Self, InvalidBaseAddress> {
        let base_addr = regs.base_addr();
        if base_addr != TCU_BASE_ADDR {
            return Err(InvalidBaseAddress(base_addr));
        }
        let channel = |id| TimerChannel {
            regs: regs.reg_block(),
            id,
        };
        Ok(Self {
            ch0: channel(Channel::Ch0),
            ch1: channel(Channel::Ch1),
            ch2: channel(Channel::Ch2),
            ch3: channel(Channel::Ch3),
            ch4: channel(Channel::Ch4),
            ch5: channel(Channel::Ch5),
            ch6: channel(Channel::Ch6),
            ch7: channel(Channel::Ch7),
        })
    }
}

/// Full and half match flags of a channel.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct MatchFlags {
    pub full: bool,
    pub half: bool,
}

/// One TCU channel.
pub struct TimerChannel<P> {
    regs: P,
    id: Channel,
}

impl<P: TcuRegisterPort> TimerChannel<P> {
    pub fn new(regs: P, id: Channel) -> Result<Self, InvalidBaseAddress> {
        let base_addr = regs.base_addr();
        if base_addr != TCU_BASE_ADDR {
            return Err(InvalidBaseAddress(base_addr));
        }
        Ok(Self { regs, id })
    }

    #[inline]
    pub fn id(&self) -> Channel {
        self.id
    }

    #[inline]
    pub fn regs_mut(&mut self) -> &mut P {
        &mut self.regs
    }

    /// Start counting.
    #[inline]
    pub fn start(&mut self) {
        self.regs.enable_counters(self.id.mask());
    }

    #[inline]
    pub fn stop(&mut self) {
        self.regs.disable_counters(self.id.mask());
    }

    pub fn is_running(&mut self) -> bool {
        self.regs.enabled() & self.id.mask() != 0
    }

    /// Ungate the channel clock.
    #[inline]
    pub fn supply_clock(&mut self) {
        self.regs.start_clocks(self.id.mask());
    }

    #[inline]
    pub fn gate_clock(&mut self) {
        self.regs.stop_clocks(self.id.mask());
    }

    #[inline]
    pub fn read_counter(&mut self) -> u16 {
        self.regs.counter(self.id)
    }

    pub fn match_flags(&mut self) -> MatchFlags {
        let flags = self.regs.flags();
        MatchFlags {
            full: flags & (1 << self.id as u32) != 0,
            half: flags & (1 << (self.id as u32 + 16)) != 0,
        }
    }

    #[inline]
    pub fn clear_match_flags(&mut self) {
        self.regs.clear_flags(self.id.flag_bits());
    }

    #[inline]
    pub fn enable_match_irqs(&mut self) {
        self.regs.unmask_irqs(self.id.flag_bits());
    }

    #[inline]
    pub fn disable_match_irqs(&mut self) {
        self.regs.mask_irqs(self.id.flag_bits());
    }

    /// True if both match interrupts of the channel are unmasked.
    pub fn match_irqs_enabled(&mut self) -> bool {
        self.regs.irq_mask() & self.id.flag_bits() == 0
    }

    /// Full compare value, the period in counter ticks.
    #[inline]
    pub fn period(&mut self) -> u16 {
        self.regs.full(self.id)
    }

    pub fn modify_control(&mut self, f: impl FnOnce(ChannelControl) -> ChannelControl) {
        let ctrl = f(self.regs.control(self.id));
        self.regs.write_control(self.id, ctrl);
    }
}
