//! Register level models of the peripherals, used by the driver tests.
//!
//! Each model keeps its state behind an [Arc]/[Mutex] pair. The port handles given to the
//! drivers and the test side inspection handle share that state.
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::vec::Vec;

use jz4780::gpio::{GPIOZ_BASE_ADDR, NUM_PORTS};
use jz4780::msc::{
    ClockRate, CommandDataControl, Control, Interrupt, Interrupts, MSC_0_BASE_ADDR, Status,
};
use jz4780::tcu::{ChannelControl, FifoControl, NUM_CHANNELS, TCU_BASE_ADDR};

use crate::RegisterPort;
use crate::gpio::{GpioRegisterPort, Latch, PinState, PortId};
use crate::msc::MscRegisterPort;
use crate::tcu::{Channel, TcuRegisterPort};

fn lock<T>(state: &Mutex<T>) -> MutexGuard<'_, T> {
    state.lock().unwrap()
}

//==================================================================================================
// GPIO
//==================================================================================================

#[derive(Debug, Default, Copy, Clone)]
struct PortState {
    latches: [u32; 4],
    levels: u32,
    flags: u32,
    pull_disable: u32,
    stuck_low: [u32; 4],
    stuck_flags: u32,
    flag_clear_writes: usize,
}

#[derive(Debug, Default)]
struct GpioBank {
    ports: [PortState; NUM_PORTS],
    staged_set: [u32; 4],
    staged_clear: [u32; 4],
    group_loads: Vec<u8>,
}

impl GpioBank {
    fn write_latch(&mut self, ordinal: usize, latch: Latch, value: u32) {
        let port = &mut self.ports[ordinal];
        port.latches[latch.index()] = value & !port.stuck_low[latch.index()];
    }
}

/// Model of the six GPIO ports and the GPIOZ staging block.
#[derive(Debug, Default, Clone)]
pub struct SimGpio {
    bank: Arc<Mutex<GpioBank>>,
}

pub struct SimGpioPort {
    bank: Arc<Mutex<GpioBank>>,
    addr: usize,
}

impl SimGpio {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn port(&self, id: PortId) -> SimGpioPort {
        self.at(id.base_addr())
    }

    pub fn gpioz(&self) -> SimGpioPort {
        self.at(GPIOZ_BASE_ADDR)
    }

    /// Handle at an arbitrary address. Accesses to addresses without a port are ignored.
    pub fn at(&self, addr: usize) -> SimGpioPort {
        SimGpioPort {
            bank: self.bank.clone(),
            addr,
        }
    }

    pub fn latches(&self, id: PortId) -> [u32; 4] {
        lock(&self.bank).ports[id.ordinal()].latches
    }

    pub fn set_latches(&self, id: PortId, latches: [u32; 4]) {
        lock(&self.bank).ports[id.ordinal()].latches = latches;
    }

    /// Make latch bits of a port ignore writes of 1.
    pub fn stick_low(&self, id: PortId, latch: Latch, bits: u32) {
        let mut bank = lock(&self.bank);
        let port = &mut bank.ports[id.ordinal()];
        port.stuck_low[latch.index()] |= bits;
        port.latches[latch.index()] &= !bits;
    }

    /// Drive the input level of a pin. Sets the interrupt flag if the trigger configured in
    /// the latches matches.
    pub fn drive(&self, id: PortId, pin: u8, state: PinState) {
        let mut bank = lock(&self.bank);
        let port = &mut bank.ports[id.ordinal()];
        let bit = 1 << pin;
        let old_high = port.levels & bit != 0;
        let new_high = state == PinState::High;
        if new_high {
            port.levels |= bit;
        } else {
            port.levels &= !bit;
        }
        if port.latches[Latch::Interrupt.index()] & bit == 0 {
            return;
        }
        let pattern1 = port.latches[Latch::Pattern1.index()] & bit != 0;
        let pattern0 = port.latches[Latch::Pattern0.index()] & bit != 0;
        let fire = match (pattern1, pattern0) {
            (false, false) => !new_high,
            (false, true) => new_high,
            (true, false) => old_high && !new_high,
            (true, true) => !old_high && new_high,
        };
        if fire {
            port.flags |= bit;
        }
    }

    pub fn flags(&self, id: PortId) -> u32 {
        lock(&self.bank).ports[id.ordinal()].flags
    }

    /// Make flag bits of a port ignore clear writes.
    pub fn stick_flags(&self, id: PortId, bits: u32) {
        lock(&self.bank).ports[id.ordinal()].stuck_flags |= bits;
    }

    pub fn flag_clear_writes(&self, id: PortId) -> usize {
        lock(&self.bank).ports[id.ordinal()].flag_clear_writes
    }

    pub fn pull_disabled(&self, id: PortId) -> u32 {
        lock(&self.bank).ports[id.ordinal()].pull_disable
    }

    /// Group ids written to the GPIOZ group load register so far.
    pub fn group_loads(&self) -> Vec<u8> {
        lock(&self.bank).group_loads.clone()
    }
}

impl SimGpioPort {
    fn ordinal(&self) -> Option<usize> {
        PortId::from_base_addr(self.addr).map(PortId::ordinal)
    }

    fn is_gpioz(&self) -> bool {
        self.addr == GPIOZ_BASE_ADDR
    }

    fn read(&self, f: impl FnOnce(&PortState) -> u32) -> u32 {
        self.ordinal()
            .map(|ordinal| f(&lock(&self.bank).ports[ordinal]))
            .unwrap_or(0)
    }
}

impl RegisterPort for SimGpioPort {
    fn base_addr(&self) -> usize {
        self.addr
    }
}

impl GpioRegisterPort for SimGpioPort {
    fn pin_levels(&mut self) -> u32 {
        self.read(|p| p.levels)
    }

    fn latch(&mut self, latch: Latch) -> u32 {
        self.read(|p| p.latches[latch.index()])
    }

    fn set_latch_bits(&mut self, latch: Latch, bits: u32) {
        let mut bank = lock(&self.bank);
        if self.is_gpioz() {
            bank.staged_set[latch.index()] |= bits;
            bank.staged_clear[latch.index()] &= !bits;
        } else if let Some(ordinal) = self.ordinal() {
            let value = bank.ports[ordinal].latches[latch.index()] | bits;
            bank.write_latch(ordinal, latch, value);
        }
    }

    fn clear_latch_bits(&mut self, latch: Latch, bits: u32) {
        let mut bank = lock(&self.bank);
        if self.is_gpioz() {
            bank.staged_clear[latch.index()] |= bits;
            bank.staged_set[latch.index()] &= !bits;
        } else if let Some(ordinal) = self.ordinal() {
            let value = bank.ports[ordinal].latches[latch.index()] & !bits;
            bank.write_latch(ordinal, latch, value);
        }
    }

    fn flags(&mut self) -> u32 {
        self.read(|p| p.flags)
    }

    fn clear_flags(&mut self, bits: u32) {
        if let Some(ordinal) = self.ordinal() {
            let mut bank = lock(&self.bank);
            let port = &mut bank.ports[ordinal];
            port.flags &= !(bits & !port.stuck_flags);
            port.flag_clear_writes += 1;
        }
    }

    fn pull_disabled(&mut self) -> u32 {
        self.read(|p| p.pull_disable)
    }

    fn set_pull_disable_bits(&mut self, bits: u32) {
        if let Some(ordinal) = self.ordinal() {
            lock(&self.bank).ports[ordinal].pull_disable |= bits;
        }
    }

    fn clear_pull_disable_bits(&mut self, bits: u32) {
        if let Some(ordinal) = self.ordinal() {
            lock(&self.bank).ports[ordinal].pull_disable &= !bits;
        }
    }

    fn load_group(&mut self, group_id: u8) {
        if !self.is_gpioz() {
            return;
        }
        let mut bank = lock(&self.bank);
        bank.group_loads.push(group_id);
        let target = group_id as usize;
        if target < NUM_PORTS {
            for latch in Latch::ALL {
                let i = latch.index();
                let value = (bank.ports[target].latches[i] | bank.staged_set[i]) & !bank.staged_clear[i];
                bank.write_latch(target, latch, value);
            }
        }
        bank.staged_set = [0; 4];
        bank.staged_clear = [0; 4];
    }
}

//==================================================================================================
// MSC
//==================================================================================================

/// Register writes of the MSC model, in program order.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum MscWrite {
    Control(u32),
    ClockRate(u32),
    CommandDataControl(u32),
    ResponseTimeout(u32),
    ReadTimeout(u32),
    BlockLen(u16),
    BlockCount(u16),
    IrqMask(u32),
    IrqFlagsClear(u32),
    CommandIndex(u8),
    Argument(u32),
}

#[derive(Debug)]
struct MscState {
    status: u32,
    irq_mask: u32,
    irq_flags: u32,
    responses: VecDeque<u16>,
    response_reads: usize,
    rx: VecDeque<u32>,
    tx: Vec<u32>,
    writes: Vec<MscWrite>,
}

impl Default for MscState {
    fn default() -> Self {
        Self {
            status: 0,
            irq_mask: u32::MAX,
            irq_flags: 0,
            responses: VecDeque::new(),
            response_reads: 0,
            rx: VecDeque::new(),
            tx: Vec::new(),
            writes: Vec::new(),
        }
    }
}

/// Status bit derived from the receive queue.
const MSC_FIFO_EMPTY: u32 = 1 << 6;

/// Model of one MSC controller. Interrupt flags are write-1-to-clear, the response and
/// data FIFOs are queues filled by the test. The FIFO empty status bit follows the receive
/// queue.
#[derive(Debug, Default, Clone)]
pub struct SimMsc {
    state: Arc<Mutex<MscState>>,
}

pub struct SimMscPort {
    state: Arc<Mutex<MscState>>,
    addr: usize,
}

impl SimMsc {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn port(&self) -> SimMscPort {
        self.at(MSC_0_BASE_ADDR)
    }

    pub fn at(&self, addr: usize) -> SimMscPort {
        SimMscPort {
            state: self.state.clone(),
            addr,
        }
    }

    pub fn raise(&self, irq: Interrupt) {
        lock(&self.state).irq_flags |= irq.mask();
    }

    pub fn set_status(&self, status: u32) {
        lock(&self.state).status = status;
    }

    pub fn push_response(&self, halfwords: &[u16]) {
        lock(&self.state).responses.extend(halfwords);
    }

    pub fn push_rx(&self, words: impl IntoIterator<Item = u32>) {
        lock(&self.state).rx.extend(words);
    }

    pub fn irq_mask(&self) -> u32 {
        lock(&self.state).irq_mask
    }

    pub fn set_irq_mask(&self, mask: u32) {
        lock(&self.state).irq_mask = mask;
    }

    pub fn irq_flags(&self) -> u32 {
        lock(&self.state).irq_flags
    }

    pub fn response_reads(&self) -> usize {
        lock(&self.state).response_reads
    }

    pub fn rx_len(&self) -> usize {
        lock(&self.state).rx.len()
    }

    pub fn tx(&self) -> Vec<u32> {
        lock(&self.state).tx.clone()
    }

    pub fn writes(&self) -> Vec<MscWrite> {
        lock(&self.state).writes.clone()
    }

    pub fn clear_writes(&self) {
        lock(&self.state).writes.clear();
    }

    /// Last value written to the command data control register.
    pub fn cmdat(&self) -> Option<CommandDataControl> {
        lock(&self.state).writes.iter().rev().find_map(|w| match w {
            MscWrite::CommandDataControl(raw) => Some(CommandDataControl::new_with_raw_value(*raw)),
            _ => None,
        })
    }
}

impl SimMscPort {
    fn log(&self, write: MscWrite) {
        lock(&self.state).writes.push(write);
    }
}

impl RegisterPort for SimMscPort {
    fn base_addr(&self) -> usize {
        self.addr
    }
}

impl MscRegisterPort for SimMscPort {
    fn write_control(&mut self, ctrl: Control) {
        self.log(MscWrite::Control(ctrl.raw_value()));
    }

    fn status(&mut self) -> Status {
        let state = lock(&self.state);
        let empty = if state.rx.is_empty() { MSC_FIFO_EMPTY } else { 0 };
        Status::new_with_raw_value(state.status | empty)
    }

    fn set_clock_rate(&mut self, rate: ClockRate) {
        self.log(MscWrite::ClockRate(rate.raw_value()));
    }

    fn set_command_data_control(&mut self, cmdat: CommandDataControl) {
        self.log(MscWrite::CommandDataControl(cmdat.raw_value()));
    }

    fn set_response_timeout(&mut self, clocks: u32) {
        self.log(MscWrite::ResponseTimeout(clocks));
    }

    fn set_read_timeout(&mut self, clocks: u32) {
        self.log(MscWrite::ReadTimeout(clocks));
    }

    fn set_block_len(&mut self, len: u16) {
        self.log(MscWrite::BlockLen(len));
    }

    fn set_block_count(&mut self, count: u16) {
        self.log(MscWrite::BlockCount(count));
    }

    fn irq_mask(&mut self) -> Interrupts {
        Interrupts::new_with_raw_value(lock(&self.state).irq_mask)
    }

    fn set_irq_mask(&mut self, mask: Interrupts) {
        let mut state = lock(&self.state);
        state.irq_mask = mask.raw_value();
        state.writes.push(MscWrite::IrqMask(mask.raw_value()));
    }

    fn irq_flags(&mut self) -> Interrupts {
        Interrupts::new_with_raw_value(lock(&self.state).irq_flags)
    }

    fn clear_irq_flags(&mut self, flags: Interrupts) {
        let mut state = lock(&self.state);
        state.irq_flags &= !flags.raw_value();
        state.writes.push(MscWrite::IrqFlagsClear(flags.raw_value()));
    }

    fn set_command_index(&mut self, index: u8) {
        self.log(MscWrite::CommandIndex(index));
    }

    fn set_argument(&mut self, arg: u32) {
        self.log(MscWrite::Argument(arg));
    }

    fn pop_response(&mut self) -> u16 {
        let mut state = lock(&self.state);
        state.response_reads += 1;
        state.responses.pop_front().unwrap_or(0)
    }

    fn pop_rx(&mut self) -> u32 {
        lock(&self.state).rx.pop_front().unwrap_or(0)
    }

    fn push_tx(&mut self, word: u32) {
        lock(&self.state).tx.push(word);
    }
}

//==================================================================================================
// TCU
//==================================================================================================

/// Register writes of the TCU model, in program order.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum TcuWrite {
    EnableSet(u8),
    EnableClear(u8),
    StopSet(u8),
    StopClear(u8),
    FlagsClear(u32),
    MaskSet(u32),
    MaskClear(u32),
    Control(Channel, u32),
    Full(Channel, u16),
    Half(Channel, u16),
    Counter(Channel, u16),
    FifoControl(Channel, u32),
    FifoCycles(Channel, u32),
    FifoPush(Channel, u32),
}

#[derive(Debug, Default, Copy, Clone)]
struct TimerState {
    control: u32,
    full: u16,
    half: u16,
    counter: u16,
}

#[derive(Debug, Default, Clone)]
struct FifoState {
    control: u32,
    cycles: u32,
    entries: Vec<u32>,
}

#[derive(Debug)]
struct TcuState {
    enabled: u8,
    stopped: u8,
    flags: u32,
    irq_mask: u32,
    timers: [TimerState; NUM_CHANNELS],
    fifos: [FifoState; NUM_CHANNELS],
    writes: Vec<TcuWrite>,
}

impl Default for TcuState {
    fn default() -> Self {
        Self {
            enabled: 0,
            stopped: 0xFF,
            flags: 0,
            irq_mask: 0x00FF_00FF,
            timers: [TimerState::default(); NUM_CHANNELS],
            fifos: Default::default(),
            writes: Vec::new(),
        }
    }
}

/// Model of the TCU. A FIFO control write with the clear bit set empties the FIFO.
#[derive(Debug, Default, Clone)]
pub struct SimTcu {
    state: Arc<Mutex<TcuState>>,
}

pub struct SimTcuPort {
    state: Arc<Mutex<TcuState>>,
    addr: usize,
}

impl SimTcu {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn port(&self) -> SimTcuPort {
        self.at(TCU_BASE_ADDR)
    }

    pub fn at(&self, addr: usize) -> SimTcuPort {
        SimTcuPort {
            state: self.state.clone(),
            addr,
        }
    }

    pub fn enabled(&self) -> u8 {
        lock(&self.state).enabled
    }

    pub fn stopped(&self) -> u8 {
        lock(&self.state).stopped
    }

    pub fn flags(&self) -> u32 {
        lock(&self.state).flags
    }

    pub fn set_flags(&self, flags: u32) {
        lock(&self.state).flags |= flags;
    }

    pub fn irq_mask(&self) -> u32 {
        lock(&self.state).irq_mask
    }

    pub fn control(&self, ch: Channel) -> ChannelControl {
        ChannelControl::new_with_raw_value(lock(&self.state).timers[ch as usize].control)
    }

    /// Full and half compare values.
    pub fn compare(&self, ch: Channel) -> (u16, u16) {
        let timer = lock(&self.state).timers[ch as usize];
        (timer.full, timer.half)
    }

    pub fn fifo_control(&self, ch: Channel) -> FifoControl {
        FifoControl::new_with_raw_value(lock(&self.state).fifos[ch as usize].control)
    }

    pub fn fifo_cycles(&self, ch: Channel) -> u32 {
        lock(&self.state).fifos[ch as usize].cycles
    }

    pub fn fifo_entries(&self, ch: Channel) -> Vec<u32> {
        lock(&self.state).fifos[ch as usize].entries.clone()
    }

    pub fn writes(&self) -> Vec<TcuWrite> {
        lock(&self.state).writes.clone()
    }

    pub fn clear_writes(&self) {
        lock(&self.state).writes.clear();
    }
}

impl RegisterPort for SimTcuPort {
    fn base_addr(&self) -> usize {
        self.addr
    }
}

impl TcuRegisterPort for SimTcuPort {
    fn reg_block(&self) -> Self {
        Self {
            state: self.state.clone(),
            addr: self.addr,
        }
    }

    fn enabled(&mut self) -> u8 {
        lock(&self.state).enabled
    }

    fn enable_counters(&mut self, mask: u8) {
        let mut state = lock(&self.state);
        state.enabled |= mask;
        state.writes.push(TcuWrite::EnableSet(mask));
    }

    fn disable_counters(&mut self, mask: u8) {
        let mut state = lock(&self.state);
        state.enabled &= !mask;
        state.writes.push(TcuWrite::EnableClear(mask));
    }

    fn stopped(&mut self) -> u8 {
        lock(&self.state).stopped
    }

    fn stop_clocks(&mut self, mask: u8) {
        let mut state = lock(&self.state);
        state.stopped |= mask;
        state.writes.push(TcuWrite::StopSet(mask));
    }

    fn start_clocks(&mut self, mask: u8) {
        let mut state = lock(&self.state);
        state.stopped &= !mask;
        state.writes.push(TcuWrite::StopClear(mask));
    }

    fn flags(&mut self) -> u32 {
        lock(&self.state).flags
    }

    fn clear_flags(&mut self, bits: u32) {
        let mut state = lock(&self.state);
        state.flags &= !bits;
        state.writes.push(TcuWrite::FlagsClear(bits));
    }

    fn irq_mask(&mut self) -> u32 {
        lock(&self.state).irq_mask
    }

    fn mask_irqs(&mut self, bits: u32) {
        let mut state = lock(&self.state);
        state.irq_mask |= bits;
        state.writes.push(TcuWrite::MaskSet(bits));
    }

    fn unmask_irqs(&mut self, bits: u32) {
        let mut state = lock(&self.state);
        state.irq_mask &= !bits;
        state.writes.push(TcuWrite::MaskClear(bits));
    }

    fn control(&mut self, ch: Channel) -> ChannelControl {
        ChannelControl::new_with_raw_value(lock(&self.state).timers[ch as usize].control)
    }

    fn write_control(&mut self, ch: Channel, ctrl: ChannelControl) {
        let mut state = lock(&self.state);
        state.timers[ch as usize].control = ctrl.raw_value();
        state.writes.push(TcuWrite::Control(ch, ctrl.raw_value()));
    }

    fn full(&mut self, ch: Channel) -> u16 {
        lock(&self.state).timers[ch as usize].full
    }

    fn write_full(&mut self, ch: Channel, value: u16) {
        let mut state = lock(&self.state);
        state.timers[ch as usize].full = value;
        state.writes.push(TcuWrite::Full(ch, value));
    }

    fn write_half(&mut self, ch: Channel, value: u16) {
        let mut state = lock(&self.state);
        state.timers[ch as usize].half = value;
        state.writes.push(TcuWrite::Half(ch, value));
    }

    fn counter(&mut self, ch: Channel) -> u16 {
        lock(&self.state).timers[ch as usize].counter
    }

    fn write_counter(&mut self, ch: Channel, value: u16) {
        let mut state = lock(&self.state);
        state.timers[ch as usize].counter = value;
        state.writes.push(TcuWrite::Counter(ch, value));
    }

    fn fifo_control(&mut self, ch: Channel) -> FifoControl {
        FifoControl::new_with_raw_value(lock(&self.state).fifos[ch as usize].control)
    }

    fn write_fifo_control(&mut self, ch: Channel, ctrl: FifoControl) {
        let mut state = lock(&self.state);
        let fifo = &mut state.fifos[ch as usize];
        if ctrl.clear() {
            fifo.entries.clear();
        }
        fifo.control = ctrl.with_clear(false).raw_value();
        state.writes.push(TcuWrite::FifoControl(ch, ctrl.raw_value()));
    }

    fn write_fifo_cycles(&mut self, ch: Channel, cycles: u32) {
        let mut state = lock(&self.state);
        state.fifos[ch as usize].cycles = cycles;
        state.writes.push(TcuWrite::FifoCycles(ch, cycles));
    }

    fn push_fifo(&mut self, ch: Channel, entry: u32) {
        let mut state = lock(&self.state);
        state.fifos[ch as usize].entries.push(entry);
        state.writes.push(TcuWrite::FifoPush(ch, entry));
    }

    fn fifo_level(&mut self, ch: Channel) -> u8 {
        lock(&self.state).fifos[ch as usize].entries.len() as u8
    }
}
