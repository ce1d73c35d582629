//! # MMC/SD controller (MSC) driver
//!
//! Interrupt driven command and data engine for the three MSC controllers. The driver takes
//! one [Request] at a time, programs the controller and hands the request back through
//! [MscEvents::request_done] once the interrupt handler [Msc::on_interrupt] saw it complete.
//!
//! Data is moved by the CPU through the 32-bit RX and TX FIFOs. Each FIFO service request
//! moves one scatter-gather segment, so segments should not be larger than the FIFO.
//!
//! The request path never enables DMA. [dma] only contains the descriptor chain builder.
use jz4780::msc::{
    BusWidth, ClockControl, ClockRate, CommandDataControl, Control, DataMode, Interrupt,
    Interrupts, MSC_0_BASE_ADDR, MSC_1_BASE_ADDR, MSC_2_BASE_ADDR, MmioRegisters,
    ResponseFormat, Status, TransferDirection,
};

use crate::{
    RegisterPort,
    time::{Hertz, Nanoseconds},
};

pub mod dma;

pub const MAX_COMMAND_INDEX: u8 = 63;
pub const MAX_BLOCK_SIZE: u16 = 4095;
/// Status polls before a controller reset is considered stuck.
pub const RESET_POLL_LIMIT: usize = 10_000;
pub const DEFAULT_RESPONSE_TIMEOUT: u32 = 0xFF;

/// Interrupt sources the request path unmasks and masks again on completion.
const REQUEST_IRQS: u32 = Interrupt::EndCmdRes.mask()
    | Interrupt::DataTransferDone.mask()
    | Interrupt::RxFifoReadRequest.mask()
    | Interrupt::TxFifoWriteRequest.mask()
    | Interrupt::FifoFull.mask()
    | Interrupt::FifoEmpty.mask()
    | Interrupt::CrcResponseError.mask()
    | Interrupt::CrcReadError.mask()
    | Interrupt::DmaDataDone.mask()
    | Interrupt::DmaEnd.mask();

/// Handling order of the interrupt sources inside one [Msc::on_interrupt] call.
pub const DISPATCH_ORDER: [Interrupt; 11] = [
    Interrupt::Sdio,
    Interrupt::EndCmdRes,
    Interrupt::DataTransferDone,
    Interrupt::DmaDataDone,
    Interrupt::DmaEnd,
    Interrupt::RxFifoReadRequest,
    Interrupt::TxFifoWriteRequest,
    Interrupt::FifoFull,
    Interrupt::FifoEmpty,
    Interrupt::CrcResponseError,
    Interrupt::CrcReadError,
];

/// Register access of one MSC controller.
pub trait MscRegisterPort: RegisterPort {
    fn write_control(&mut self, ctrl: Control);
    fn status(&mut self) -> Status;
    fn set_clock_rate(&mut self, rate: ClockRate);
    fn set_command_data_control(&mut self, cmdat: CommandDataControl);
    fn set_response_timeout(&mut self, clocks: u32);
    fn set_read_timeout(&mut self, clocks: u32);
    fn set_block_len(&mut self, len: u16);
    fn set_block_count(&mut self, count: u16);
    fn irq_mask(&mut self) -> Interrupts;
    fn set_irq_mask(&mut self, mask: Interrupts);
    fn irq_flags(&mut self) -> Interrupts;
    /// Write-1-to-clear.
    fn clear_irq_flags(&mut self, flags: Interrupts);
    fn set_command_index(&mut self, index: u8);
    fn set_argument(&mut self, arg: u32);
    /// Pop one half word from the response FIFO.
    fn pop_response(&mut self) -> u16;
    fn pop_rx(&mut self) -> u32;
    fn push_tx(&mut self, word: u32);
}

impl RegisterPort for MmioRegisters<'static> {
    #[inline]
    fn base_addr(&self) -> usize {
        unsafe { self.ptr() as usize }
    }
}

impl MscRegisterPort for MmioRegisters<'static> {
    #[inline]
    fn write_control(&mut self, ctrl: Control) {
        self.write_ctrl(ctrl);
    }

    #[inline]
    fn status(&mut self) -> Status {
        self.read_status()
    }

    #[inline]
    fn set_clock_rate(&mut self, rate: ClockRate) {
        self.write_clock_rate(rate);
    }

    #[inline]
    fn set_command_data_control(&mut self, cmdat: CommandDataControl) {
        self.write_cmdat(cmdat);
    }

    #[inline]
    fn set_response_timeout(&mut self, clocks: u32) {
        self.write_response_timeout(clocks);
    }

    #[inline]
    fn set_read_timeout(&mut self, clocks: u32) {
        self.write_read_timeout(clocks);
    }

    #[inline]
    fn set_block_len(&mut self, len: u16) {
        self.write_block_len(len as u32);
    }

    #[inline]
    fn set_block_count(&mut self, count: u16) {
        self.write_block_count(count as u32);
    }

    #[inline]
    fn irq_mask(&mut self) -> Interrupts {
        self.read_irq_mask()
    }

    #[inline]
    fn set_irq_mask(&mut self, mask: Interrupts) {
        self.write_irq_mask(mask);
    }

    #[inline]
    fn irq_flags(&mut self) -> Interrupts {
        self.read_irq_flags()
    }

    #[inline]
    fn clear_irq_flags(&mut self, flags: Interrupts) {
        self.write_irq_flags(flags);
    }

    #[inline]
    fn set_command_index(&mut self, index: u8) {
        self.write_cmd(index as u32);
    }

    #[inline]
    fn set_argument(&mut self, arg: u32) {
        self.write_arg(arg);
    }

    #[inline]
    fn pop_response(&mut self) -> u16 {
        self.read_response_fifo() as u16
    }

    #[inline]
    fn pop_rx(&mut self) -> u32 {
        self.read_rx_fifo()
    }

    #[inline]
    fn push_tx(&mut self, word: u32) {
        self.write_tx_fifo(word);
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum MscId {
    Msc0,
    Msc1,
    Msc2,
}

impl MscId {
    pub const fn base_addr(self) -> usize {
        match self {
            MscId::Msc0 => MSC_0_BASE_ADDR,
            MscId::Msc1 => MSC_1_BASE_ADDR,
            MscId::Msc2 => MSC_2_BASE_ADDR,
        }
    }

    pub const fn from_base_addr(addr: usize) -> Option<Self> {
        match addr {
            MSC_0_BASE_ADDR => Some(MscId::Msc0),
            MSC_1_BASE_ADDR => Some(MscId::Msc1),
            MSC_2_BASE_ADDR => Some(MscId::Msc2),
            _ => None,
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ResponseType {
    None,
    R1,
    /// R1 with busy signalling on DAT0.
    R1b,
    /// 136-bit CID/CSD response.
    R2,
    R3,
    R4,
    R5,
    R6,
    R7,
}

impl ResponseType {
    pub const fn format(self) -> ResponseFormat {
        match self {
            ResponseType::None => ResponseFormat::None,
            ResponseType::R1 | ResponseType::R1b => ResponseFormat::R1,
            ResponseType::R2 => ResponseFormat::R2,
            ResponseType::R3 => ResponseFormat::R3,
            ResponseType::R4 => ResponseFormat::R4,
            ResponseType::R5 => ResponseFormat::R5,
            ResponseType::R6 => ResponseFormat::R6,
            ResponseType::R7 => ResponseFormat::R7,
        }
    }

    #[inline]
    pub const fn busy(self) -> bool {
        matches!(self, ResponseType::R1b)
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum State {
    Idle,
    CommandIssued,
    ResponseReceived,
    DataTransferActive,
    RxFifoReadRequest,
    TxFifoWriteRequest,
    DataTransferDone,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransferError {
    #[error("response timeout")]
    ResponseTimeout,
    #[error("response CRC error")]
    ResponseCrc,
    #[error("read timeout")]
    ReadTimeout,
    #[error("read CRC error")]
    ReadCrc,
    #[error("write CRC error")]
    WriteCrc,
    #[error("{transferred} of {expected} bytes transferred")]
    Incomplete { transferred: usize, expected: usize },
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RequestError {
    #[error("a request is already in flight")]
    Busy,
    #[error("command index {0} is larger than 63")]
    InvalidCommandIndex(u8),
    #[error("block size {0} is not supported")]
    InvalidBlockSize(u16),
    #[error("block count is zero")]
    ZeroBlockCount,
    #[error("length of segment {0} is not a multiple of 4")]
    MisalignedSegment(usize),
    #[error("segments hold {available} bytes, transfer needs {required}")]
    BufferTooSmall { available: usize, required: usize },
    #[error("stop command without data phase")]
    StopWithoutData,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InitError {
    #[error("invalid MSC base address {0:#010x}")]
    InvalidBaseAddress(usize),
    #[error("controller reset did not complete")]
    ResetTimeout,
    #[error(transparent)]
    Clock(#[from] FrequencyIsZeroError),
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
#[error("frequency is zero")]
pub struct FrequencyIsZeroError;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Command {
    pub index: u8,
    pub arg: u32,
    pub response_type: ResponseType,
    /// Response words, most significant first. Only word 0 is used for 48-bit responses.
    pub response: [u32; 4],
    pub error: Option<TransferError>,
}

impl Command {
    pub const fn new(index: u8, arg: u32, response_type: ResponseType) -> Self {
        Self {
            index,
            arg,
            response_type,
            response: [0; 4],
            error: None,
        }
    }
}

#[derive(Debug)]
pub struct Data<'a> {
    pub direction: TransferDirection,
    pub mode: DataMode,
    pub block_size: u16,
    pub block_count: u16,
    pub timeout: Nanoseconds,
    /// Timeout part given in card clocks, added to [Self::timeout].
    pub timeout_clks: u32,
    pub segments: &'a mut [&'a mut [u8]],
    pub bytes_xfered: usize,
    pub error: Option<TransferError>,
    next_segment: usize,
    segment_offset: usize,
}

impl<'a> Data<'a> {
    pub const DEFAULT_TIMEOUT: Nanoseconds = Nanoseconds::from_ticks(100_000_000);

    pub fn new(
        direction: TransferDirection,
        block_size: u16,
        block_count: u16,
        segments: &'a mut [&'a mut [u8]],
    ) -> Self {
        Self {
            direction,
            mode: DataMode::Block,
            block_size,
            block_count,
            timeout: Self::DEFAULT_TIMEOUT,
            timeout_clks: 0,
            segments,
            bytes_xfered: 0,
            error: None,
            next_segment: 0,
            segment_offset: 0,
        }
    }

    pub fn with_timeout(mut self, timeout: Nanoseconds, timeout_clks: u32) -> Self {
        self.timeout = timeout;
        self.timeout_clks = timeout_clks;
        self
    }

    pub fn with_mode(mut self, mode: DataMode) -> Self {
        self.mode = mode;
        self
    }

    /// Transfer length in bytes.
    #[inline]
    pub fn len(&self) -> usize {
        self.block_size as usize * self.block_count as usize
    }

    #[inline]
    pub fn is_complete(&self) -> bool {
        self.bytes_xfered >= self.len()
    }

    /// Part of the current segment which the next FIFO service moves. Never reaches past the
    /// transfer length.
    fn current_span(&self) -> Option<(usize, core::ops::Range<usize>)> {
        let remaining = self.len().saturating_sub(self.bytes_xfered);
        if remaining == 0 {
            return None;
        }
        let segment = self.segments.get(self.next_segment)?;
        let start = self.segment_offset;
        Some((self.next_segment, start..segment.len().min(start + remaining)))
    }

    fn advance(&mut self, moved: usize) {
        self.bytes_xfered += moved;
        self.segment_offset += moved;
        if self.segment_offset >= self.segments[self.next_segment].len() || self.is_complete() {
            self.next_segment += 1;
            self.segment_offset = 0;
        }
    }

    /// True once the FIFO requests of this transfer should stay masked.
    fn service_done(&self) -> bool {
        self.is_complete() || self.next_segment >= self.segments.len()
    }

    fn validate(&self) -> Result<(), RequestError> {
        if self.block_size == 0 || self.block_size > MAX_BLOCK_SIZE {
            return Err(RequestError::InvalidBlockSize(self.block_size));
        }
        if self.block_count == 0 {
            return Err(RequestError::ZeroBlockCount);
        }
        let mut available = 0;
        for (i, segment) in self.segments.iter().enumerate() {
            if segment.len() % 4 != 0 {
                return Err(RequestError::MisalignedSegment(i));
            }
            available += segment.len();
        }
        if available < self.len() {
            return Err(RequestError::BufferTooSmall {
                available,
                required: self.len(),
            });
        }
        Ok(())
    }
}

#[derive(Debug)]
pub struct Request<'a> {
    pub cmd: Command,
    pub data: Option<Data<'a>>,
    /// Stop command sent by the controller after the data phase (AutoCMD12).
    pub stop: Option<Command>,
}

impl<'a> Request<'a> {
    pub const fn new(cmd: Command) -> Self {
        Self {
            cmd,
            data: None,
            stop: None,
        }
    }

    pub fn with_data(mut self, data: Data<'a>) -> Self {
        self.data = Some(data);
        self
    }

    pub fn with_stop(mut self, stop: Command) -> Self {
        self.stop = Some(stop);
        self
    }
}

/// Callbacks of the MSC engine. They run in the context of [Msc::on_interrupt].
pub trait MscEvents<'a> {
    /// A request completed, successfully or with errors in [Command::error] or
    /// [Data::error].
    fn request_done(&mut self, request: Request<'a>);

    fn sdio_interrupt(&mut self) {}

    fn state_changed(&mut self, _from: State, _to: State) {}
}

#[derive(Debug, Copy, Clone)]
pub struct Config {
    pub bus_width: BusWidth,
    /// Response timeout in card clocks.
    pub response_timeout: u32,
    /// Card clock used during card identification.
    pub initial_clock: Hertz,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bus_width: BusWidth::_1bit,
            response_timeout: DEFAULT_RESPONSE_TIMEOUT,
            initial_clock: Hertz::from_raw(400_000),
        }
    }
}

/// Convert a data timeout into controller clocks for the read timeout register.
///
/// The result saturates at [u32::MAX].
pub fn timeout_ticks(timeout_clks: u32, timeout: Nanoseconds, clock: Hertz) -> u32 {
    let ticks = u64::from(timeout_clks)
        + (u64::from(timeout.ticks()) / 1000) * (u64::from(clock.raw()) / 1000);
    u32::try_from(ticks).unwrap_or(u32::MAX)
}

#[inline]
const fn assemble_response_word(first: u16, second: u16, third: u16) -> u32 {
    ((first as u32) << 24) | ((second as u32) << 8) | ((third as u32) >> 8)
}

/// Read a response from the 16-bit response FIFO.
///
/// 48-bit responses take three reads and fill word 0. The 136-bit R2 response takes nine
/// reads: the last half word of one word is the first half word of the next one.
pub fn read_response<P: MscRegisterPort>(regs: &mut P, response_type: ResponseType) -> [u32; 4] {
    let mut response = [0; 4];
    match response_type {
        ResponseType::None => (),
        ResponseType::R2 => {
            let mut carry = regs.pop_response();
            for word in response.iter_mut() {
                let mid = regs.pop_response();
                let next = regs.pop_response();
                *word = assemble_response_word(carry, mid, next);
                carry = next;
            }
        }
        _ => {
            let r0 = regs.pop_response();
            let r1 = regs.pop_response();
            let r2 = regs.pop_response();
            response[0] = assemble_response_word(r0, r1, r2);
        }
    }
    response
}

pub struct Msc<'a, P, E> {
    id: MscId,
    regs: P,
    ref_clk: Hertz,
    clock: Hertz,
    config: Config,
    state: State,
    request: Option<Request<'a>>,
    events: E,
}

impl<'a, P: MscRegisterPort, E: MscEvents<'a>> Msc<'a, P, E> {
    /// Create the driver and initialize the controller.
    ///
    /// `ref_clk` is the controller input clock the card clock is divided from.
    pub fn new(regs: P, ref_clk: Hertz, config: Config, events: E) -> Result<Self, InitError> {
        let base_addr = regs.base_addr();
        let id = MscId::from_base_addr(base_addr).ok_or(InitError::InvalidBaseAddress(base_addr))?;
        let mut msc = Self {
            id,
            regs,
            ref_clk,
            clock: ref_clk,
            config,
            state: State::Idle,
            request: None,
            events,
        };
        msc.init()?;
        Ok(msc)
    }

    /// Reset the controller, mask and clear all interrupts and start the card clock.
    ///
    /// A request in flight is dropped without completion.
    pub fn init(&mut self) -> Result<(), InitError> {
        self.request = None;
        self.regs
            .write_control(Control::new_with_raw_value(0).with_reset(true));
        let mut done = false;
        for _ in 0..RESET_POLL_LIMIT {
            if !self.regs.status().is_resetting() {
                done = true;
                break;
            }
        }
        if !done {
            log::warn!("{:?}: reset did not complete", self.id);
            return Err(InitError::ResetTimeout);
        }
        self.regs
            .set_irq_mask(Interrupts::new_with_raw_value(u32::MAX));
        self.regs
            .clear_irq_flags(Interrupts::new_with_raw_value(Interrupts::ALL_RAW));
        self.regs.set_response_timeout(self.config.response_timeout);
        self.set_clock(self.config.initial_clock)?;
        self.regs.write_control(
            Control::new_with_raw_value(0).with_clock_control(ClockControl::Start),
        );
        self.set_state(State::Idle);
        log::debug!("{:?}: initialized, card clock {} Hz", self.id, self.clock.raw());
        Ok(())
    }

    /// Select the card clock. The controller divides its input clock by a power of two, the
    /// smallest divider which does not exceed `target` is used (at most 128).
    ///
    /// Returns the actual card clock.
    pub fn set_clock(&mut self, target: Hertz) -> Result<Hertz, FrequencyIsZeroError> {
        if target.raw() == 0 {
            return Err(FrequencyIsZeroError);
        }
        let mut exp = 0;
        while exp < 7 && (self.ref_clk.raw() >> exp) > target.raw() {
            exp += 1;
        }
        self.regs.set_clock_rate(
            ClockRate::new_with_raw_value(0).with_divider_exp(arbitrary_int::u3::new(exp)),
        );
        self.clock = Hertz::from_raw(self.ref_clk.raw() >> exp);
        Ok(self.clock)
    }

    /// Bus width used for the following requests.
    pub fn set_bus_width(&mut self, width: BusWidth) {
        self.config.bus_width = width;
    }

    pub fn enable_sdio_irq(&mut self, enable: bool) {
        if enable {
            self.unmask(Interrupt::Sdio.mask());
        } else {
            self.mask(Interrupt::Sdio.mask());
        }
    }

    #[inline]
    pub fn id(&self) -> MscId {
        self.id
    }

    #[inline]
    pub fn clock(&self) -> Hertz {
        self.clock
    }

    #[inline]
    pub fn state(&self) -> State {
        self.state
    }

    #[inline]
    pub fn events(&self) -> &E {
        &self.events
    }

    #[inline]
    pub fn events_mut(&mut self) -> &mut E {
        &mut self.events
    }

    /// Start a request. Completion is reported through [MscEvents::request_done].
    pub fn request(&mut self, mut req: Request<'a>) -> Result<(), RequestError> {
        if self.state != State::Idle || self.request.is_some() {
            return Err(RequestError::Busy);
        }
        for cmd in core::iter::once(&req.cmd).chain(req.stop.as_ref()) {
            if cmd.index > MAX_COMMAND_INDEX {
                return Err(RequestError::InvalidCommandIndex(cmd.index));
            }
        }
        match &req.data {
            Some(data) => data.validate()?,
            None if req.stop.is_some() => return Err(RequestError::StopWithoutData),
            None => (),
        }

        self.regs
            .clear_irq_flags(Interrupts::new_with_raw_value(Interrupts::ALL_RAW));
        let mut cmdat = CommandDataControl::new_with_raw_value(0)
            .with_response_format(req.cmd.response_type.format())
            .with_busy(req.cmd.response_type.busy())
            .with_auto_cmd12(req.stop.is_some())
            .with_bus_width(self.config.bus_width);
        let mut unmask = Interrupt::EndCmdRes.mask();
        if let Some(data) = req.data.as_mut() {
            data.bytes_xfered = 0;
            data.next_segment = 0;
            data.segment_offset = 0;
            data.error = None;
            let ticks = timeout_ticks(data.timeout_clks, data.timeout, self.clock);
            self.regs.set_block_count(data.block_count);
            self.regs.set_block_len(data.block_size);
            self.regs.set_read_timeout(ticks);
            cmdat = cmdat
                .with_data_enable(true)
                .with_direction(data.direction)
                .with_data_mode(data.mode);
            let fifo_request = match data.direction {
                TransferDirection::Read => Interrupt::RxFifoReadRequest,
                TransferDirection::Write => Interrupt::TxFifoWriteRequest,
            };
            unmask |= fifo_request.mask()
                | Interrupt::FifoFull.mask()
                | Interrupt::FifoEmpty.mask()
                | Interrupt::CrcResponseError.mask()
                | Interrupt::CrcReadError.mask()
                | Interrupt::DataTransferDone.mask();
        }
        req.cmd.response = [0; 4];
        req.cmd.error = None;
        self.regs.set_command_data_control(cmdat);
        self.regs.set_command_index(req.cmd.index);
        self.regs.set_argument(req.cmd.arg);
        self.unmask(unmask);
        log::trace!(
            "{:?}: CMD{} arg {:#010x}, data: {}",
            self.id,
            req.cmd.index,
            req.cmd.arg,
            req.data.is_some()
        );
        self.request = Some(req);
        self.set_state(State::CommandIssued);
        self.regs
            .write_control(Control::new_with_raw_value(0).with_start_op(true));
        Ok(())
    }

    /// Interrupt handler. Handles every pending and unmasked source in [DISPATCH_ORDER] and
    /// returns the set of sources which were pending.
    pub fn on_interrupt(&mut self) -> Interrupts {
        let pending = self.regs.irq_flags().raw_value() & !self.regs.irq_mask().raw_value();
        for irq in DISPATCH_ORDER {
            if pending & irq.mask() != 0 {
                self.dispatch(irq);
            }
        }
        Interrupts::new_with_raw_value(pending)
    }

    fn dispatch(&mut self, irq: Interrupt) {
        match irq {
            Interrupt::Sdio => {
                self.ack(irq);
                self.events.sdio_interrupt();
            }
            Interrupt::EndCmdRes => self.on_end_cmd_res(),
            Interrupt::DataTransferDone => self.on_data_transfer_done(),
            Interrupt::DmaDataDone | Interrupt::DmaEnd => {
                self.ack(irq);
                self.mask(irq.mask());
                log::warn!("{:?}: unexpected DMA interrupt {:?}", self.id, irq);
            }
            Interrupt::RxFifoReadRequest => self.on_rx_fifo_read_request(),
            Interrupt::TxFifoWriteRequest => self.on_tx_fifo_write_request(),
            Interrupt::FifoFull | Interrupt::FifoEmpty | Interrupt::ProgDone => {
                self.ack(irq);
                log::trace!("{:?}: {:?}", self.id, irq);
            }
            Interrupt::CrcResponseError => {
                self.ack(irq);
                match self.request.as_mut() {
                    Some(req) => {
                        req.cmd.error.get_or_insert(TransferError::ResponseCrc);
                    }
                    None => log::warn!("{:?}: response CRC error without request", self.id),
                }
            }
            Interrupt::CrcReadError => {
                self.ack(irq);
                match self.request.as_mut().and_then(|req| req.data.as_mut()) {
                    Some(data) => {
                        data.error.get_or_insert(TransferError::ReadCrc);
                    }
                    None => log::warn!("{:?}: read CRC error without data phase", self.id),
                }
            }
        }
    }

    fn on_end_cmd_res(&mut self) {
        self.ack(Interrupt::EndCmdRes);
        if self.state != State::CommandIssued {
            log::warn!("{:?}: end of command response in state {:?}", self.id, self.state);
            return;
        }
        self.mask(Interrupt::EndCmdRes.mask());
        let Some(mut req) = self.request.take() else {
            return;
        };
        let status = self.regs.status();
        if status.response_timeout() {
            req.cmd.error = Some(TransferError::ResponseTimeout);
        } else if status.crc_response_error() {
            req.cmd.error = Some(TransferError::ResponseCrc);
        } else {
            req.cmd.response = read_response(&mut self.regs, req.cmd.response_type);
        }
        self.set_state(State::ResponseReceived);
        if req.cmd.error.is_some() || req.data.is_none() {
            self.finish(req);
            return;
        }
        self.request = Some(req);
        self.set_state(State::DataTransferActive);
    }

    fn on_data_transfer_done(&mut self) {
        self.ack(Interrupt::DataTransferDone);
        if self.state != State::DataTransferActive {
            log::warn!("{:?}: data transfer done in state {:?}", self.id, self.state);
            return;
        }
        self.mask(Interrupt::DataTransferDone.mask());
        let Some(mut req) = self.request.take() else {
            return;
        };
        let status = self.regs.status();
        if let Some(data) = req.data.as_mut() {
            if data.error.is_none() {
                data.error = if status.read_timeout() {
                    Some(TransferError::ReadTimeout)
                } else if status.crc_read_error() {
                    Some(TransferError::ReadCrc)
                } else if status.crc_write_error() {
                    Some(TransferError::WriteCrc)
                } else {
                    None
                };
            }
            if data.error.is_none() && matches!(data.direction, TransferDirection::Read) {
                // Data which arrived after the last FIFO request.
                while !data.is_complete() && !self.regs.status().fifo_empty() {
                    let Some((index, span)) = data.current_span() else {
                        break;
                    };
                    let end = span.end.min(span.start + 4);
                    let word = self.regs.pop_rx().to_le_bytes();
                    let moved = end - span.start;
                    data.segments[index][span.start..end].copy_from_slice(&word[..moved]);
                    data.advance(moved);
                }
            }
            if data.error.is_none() && !data.is_complete() {
                log::warn!(
                    "{:?}: data phase ended after {} of {} bytes",
                    self.id,
                    data.bytes_xfered,
                    data.len()
                );
                data.error = Some(TransferError::Incomplete {
                    transferred: data.bytes_xfered,
                    expected: data.len(),
                });
            }
        }
        self.set_state(State::DataTransferDone);
        if let Some(stop) = req.stop.as_ref() {
            log::trace!("{:?}: CMD{} sent by controller", self.id, stop.index);
        }
        self.finish(req);
    }

    fn on_rx_fifo_read_request(&mut self) {
        self.ack(Interrupt::RxFifoReadRequest);
        if !self.fifo_service_allowed(TransferDirection::Read) {
            self.mask(Interrupt::RxFifoReadRequest.mask());
            log::warn!("{:?}: RX FIFO request in state {:?}", self.id, self.state);
            return;
        }
        self.set_state(State::RxFifoReadRequest);
        let mut exhausted = true;
        if let Some(data) = self.request.as_mut().and_then(|req| req.data.as_mut()) {
            if let Some((index, span)) = data.current_span() {
                let moved = span.len();
                for chunk in data.segments[index][span].chunks_mut(4) {
                    let word = self.regs.pop_rx().to_le_bytes();
                    chunk.copy_from_slice(&word[..chunk.len()]);
                }
                data.advance(moved);
                log::trace!("{:?}: read {} bytes", self.id, moved);
            }
            exhausted = data.service_done();
        }
        if exhausted {
            self.mask(Interrupt::RxFifoReadRequest.mask());
        }
        self.set_state(State::DataTransferActive);
    }

    fn on_tx_fifo_write_request(&mut self) {
        self.ack(Interrupt::TxFifoWriteRequest);
        if !self.fifo_service_allowed(TransferDirection::Write) {
            self.mask(Interrupt::TxFifoWriteRequest.mask());
            log::warn!("{:?}: TX FIFO request in state {:?}", self.id, self.state);
            return;
        }
        self.set_state(State::TxFifoWriteRequest);
        let mut exhausted = true;
        if let Some(data) = self.request.as_mut().and_then(|req| req.data.as_mut()) {
            if let Some((index, span)) = data.current_span() {
                let moved = span.len();
                for chunk in data.segments[index][span].chunks(4) {
                    let mut word = [0; 4];
                    word[..chunk.len()].copy_from_slice(chunk);
                    self.regs.push_tx(u32::from_le_bytes(word));
                }
                data.advance(moved);
                log::trace!("{:?}: wrote {} bytes", self.id, moved);
            }
            exhausted = data.service_done();
        }
        if exhausted {
            self.mask(Interrupt::TxFifoWriteRequest.mask());
        }
        self.set_state(State::DataTransferActive);
    }

    fn fifo_service_allowed(&self, direction: TransferDirection) -> bool {
        self.state == State::DataTransferActive
            && self
                .request
                .as_ref()
                .and_then(|req| req.data.as_ref())
                .is_some_and(|data| data.direction == direction)
    }

    fn finish(&mut self, req: Request<'a>) {
        self.mask(REQUEST_IRQS);
        self.set_state(State::Idle);
        self.events.request_done(req);
    }

    fn set_state(&mut self, to: State) {
        let from = self.state;
        if from == to {
            return;
        }
        log::trace!("{:?}: {:?} -> {:?}", self.id, from, to);
        self.state = to;
        self.events.state_changed(from, to);
    }

    #[inline]
    fn ack(&mut self, irq: Interrupt) {
        self.regs
            .clear_irq_flags(Interrupts::new_with_raw_value(irq.mask()));
    }

    fn mask(&mut self, bits: u32) {
        let mask = self.regs.irq_mask().raw_value() | bits;
        self.regs.set_irq_mask(Interrupts::new_with_raw_value(mask));
    }

    fn unmask(&mut self, bits: u32) {
        let mask = self.regs.irq_mask().raw_value() & !bits;
        self.regs.set_irq_mask(Interrupts::new_with_raw_value(mask));
    }
}
