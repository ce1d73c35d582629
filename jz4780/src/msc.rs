//! # MMC/SD controller (MSC) register module.
use arbitrary_int::{u2, u3};

pub const MSC_0_BASE_ADDR: usize = 0x1345_0000;
pub const MSC_1_BASE_ADDR: usize = 0x1346_0000;
pub const MSC_2_BASE_ADDR: usize = 0x1347_0000;

/// Depth of the RX and TX data FIFOs in 32-bit words.
pub const DATA_FIFO_DEPTH: usize = 128;

#[bitbybit::bitenum(u2, exhaustive = true)]
#[derive(Debug, PartialEq, Eq)]
pub enum ClockControl {
    Nop = 0b00,
    Stop = 0b01,
    Start = 0b10,
    Reserved = 0b11,
}

#[bitbybit::bitfield(u32, default = 0x0)]
#[derive(Debug)]
pub struct Control {
    /// Stop a multiple block read/write at the next block boundary.
    #[bit(7, rw)]
    exit_multiple: bool,
    #[bit(6, rw)]
    exit_transfer: bool,
    /// Reset the controller. [Status::is_resetting] stays high until it is done.
    #[bit(3, rw)]
    reset: bool,
    /// Issue the command staged in the command, argument and command data registers.
    #[bit(2, rw)]
    start_op: bool,
    #[bits(0..=1, rw)]
    clock_control: ClockControl,
}

#[bitbybit::bitfield(u32)]
#[derive(Debug)]
pub struct Status {
    #[bit(15, r)]
    is_resetting: bool,
    #[bit(13, r)]
    prog_done: bool,
    #[bit(12, r)]
    data_transfer_done: bool,
    #[bit(11, r)]
    end_cmd_res: bool,
    #[bit(8, r)]
    clock_enabled: bool,
    #[bit(7, r)]
    fifo_full: bool,
    #[bit(6, r)]
    fifo_empty: bool,
    #[bit(5, r)]
    crc_response_error: bool,
    #[bit(4, r)]
    crc_read_error: bool,
    /// CRC status token of a written block signalled an error.
    #[bit(2, r)]
    crc_write_error: bool,
    #[bit(1, r)]
    response_timeout: bool,
    #[bit(0, r)]
    read_timeout: bool,
}

/// Hardware response format code. R1 and R1b share a code, busy signalling is selected
/// separately through [CommandDataControl::busy].
#[bitbybit::bitenum(u3, exhaustive = true)]
#[derive(Debug, PartialEq, Eq)]
pub enum ResponseFormat {
    None = 0,
    R1 = 1,
    R2 = 2,
    R3 = 3,
    R4 = 4,
    R5 = 5,
    R6 = 6,
    R7 = 7,
}

#[bitbybit::bitenum(u1, exhaustive = true)]
#[derive(Debug, PartialEq, Eq)]
pub enum TransferDirection {
    /// Card to host.
    Read = 0,
    /// Host to card.
    Write = 1,
}

#[bitbybit::bitenum(u1, exhaustive = true)]
#[derive(Debug, PartialEq, Eq)]
pub enum DataMode {
    Block = 0,
    Stream = 1,
}

#[bitbybit::bitenum(u2, exhaustive = true)]
#[derive(Debug, PartialEq, Eq)]
pub enum BusWidth {
    _1bit = 0b00,
    Reserved = 0b01,
    _4bit = 0b10,
    _8bit = 0b11,
}

#[bitbybit::bitfield(u32, default = 0x0)]
#[derive(Debug, PartialEq, Eq)]
pub struct CommandDataControl {
    /// The controller sends CMD12 on its own after the last block.
    #[bit(16, rw)]
    auto_cmd12: bool,
    #[bits(9..=10, rw)]
    bus_width: BusWidth,
    #[bit(8, rw)]
    dma_enable: bool,
    /// Send 80 initialization clocks before the command.
    #[bit(7, rw)]
    init: bool,
    /// The card signals busy on DAT0 after the response.
    #[bit(6, rw)]
    busy: bool,
    #[bit(5, rw)]
    data_mode: DataMode,
    #[bit(4, rw)]
    direction: TransferDirection,
    #[bit(3, rw)]
    data_enable: bool,
    #[bits(0..=2, rw)]
    response_format: ResponseFormat,
}

/// Interrupt sources. The discriminant is the bit position in the mask and flag registers.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[repr(u8)]
pub enum Interrupt {
    DataTransferDone = 0,
    ProgDone = 1,
    EndCmdRes = 2,
    RxFifoReadRequest = 5,
    TxFifoWriteRequest = 6,
    Sdio = 7,
    CrcResponseError = 10,
    CrcReadError = 11,
    FifoFull = 13,
    FifoEmpty = 14,
    DmaDataDone = 15,
    DmaEnd = 16,
}

impl Interrupt {
    #[inline]
    pub const fn mask(self) -> u32 {
        1 << self as u8
    }
}

/// Layout of both the interrupt mask register (a set bit masks the source) and the
/// write-1-to-clear interrupt flag register.
#[bitbybit::bitfield(u32, default = 0x0)]
#[derive(Debug, PartialEq, Eq)]
pub struct Interrupts {
    #[bit(16, rw)]
    dma_end: bool,
    #[bit(15, rw)]
    dma_data_done: bool,
    #[bit(14, rw)]
    fifo_empty: bool,
    #[bit(13, rw)]
    fifo_full: bool,
    #[bit(11, rw)]
    crc_read_error: bool,
    #[bit(10, rw)]
    crc_response_error: bool,
    #[bit(7, rw)]
    sdio: bool,
    #[bit(6, rw)]
    txfifo_write_request: bool,
    #[bit(5, rw)]
    rxfifo_read_request: bool,
    #[bit(2, rw)]
    end_cmd_res: bool,
    #[bit(1, rw)]
    prog_done: bool,
    #[bit(0, rw)]
    data_transfer_done: bool,
}

impl Interrupts {
    /// All sources with a defined bit.
    pub const ALL_RAW: u32 = 0x0001_ECE7;

    #[inline]
    pub fn contains(&self, irq: Interrupt) -> bool {
        self.raw_value() & irq.mask() != 0
    }
}

/// Command word of an SDMA descriptor.
#[bitbybit::bitfield(u32, default = 0x0)]
#[derive(Debug, PartialEq, Eq)]
pub struct DescriptorCommand {
    /// Raise the DMA end interrupt once this descriptor completes.
    #[bit(1, rw)]
    end_irq: bool,
    /// Continue with the descriptor at the next descriptor address.
    #[bit(0, rw)]
    link: bool,
}

#[bitbybit::bitfield(u32)]
#[derive(Debug)]
pub struct ClockRate {
    /// Controller clock divided by 2^n.
    #[bits(0..=2, rw)]
    divider_exp: u3,
}

#[bitbybit::bitfield(u32)]
#[derive(Debug)]
pub struct DmaControl {
    #[bits(2..=3, rw)]
    burst: u2,
    #[bit(1, rw)]
    align_enable: bool,
    #[bit(0, rw)]
    enable: bool,
}

#[derive(derive_mmio::Mmio)]
#[repr(C)]
pub struct Registers {
    #[mmio(Write)]
    ctrl: Control,
    #[mmio(PureRead)]
    status: Status,
    clock_rate: ClockRate,
    cmdat: CommandDataControl,
    /// Response timeout in controller clocks.
    response_timeout: u32,
    /// Read timeout in controller clocks.
    read_timeout: u32,
    block_len: u32,
    block_count: u32,
    /// Number of successfully transferred blocks.
    #[mmio(PureRead)]
    blocks_done: u32,
    irq_mask: Interrupts,
    #[mmio(PureRead, Write)]
    irq_flags: Interrupts,
    cmd: u32,
    arg: u32,
    /// 16-bit response FIFO. Every read pops one half word.
    #[mmio(Read)]
    response_fifo: u32,
    #[mmio(Read)]
    rx_fifo: u32,
    #[mmio(Write)]
    tx_fifo: u32,
    low_power: u32,
    dma_ctrl: DmaControl,
    dma_next_desc: u32,
    #[mmio(PureRead)]
    dma_data_addr: u32,
    #[mmio(PureRead)]
    dma_len: u32,
    #[mmio(PureRead)]
    dma_cmd: DescriptorCommand,
}

static_assertions::const_assert_eq!(core::mem::size_of::<Registers>(), 0x58);
static_assertions::const_assert_eq!(core::mem::offset_of!(Registers, irq_flags), 0x28);
static_assertions::const_assert_eq!(core::mem::offset_of!(Registers, response_fifo), 0x34);

impl Registers {
    /// Create a new MSC MMIO instance for MSC0 at address [MSC_0_BASE_ADDR].
    ///
    /// # Safety
    ///
    /// This API can be used to potentially create a driver to the same peripheral structure
    /// from multiple threads. The user must ensure that concurrent accesses are safe and do not
    /// interfere with each other.
    pub const unsafe fn new_mmio_fixed_0() -> MmioRegisters<'static> {
        unsafe { Self::new_mmio_at(MSC_0_BASE_ADDR) }
    }

    /// Create a new MSC MMIO instance for MSC1 at address [MSC_1_BASE_ADDR].
    ///
    /// # Safety
    ///
    /// See [Self::new_mmio_fixed_0].
    pub const unsafe fn new_mmio_fixed_1() -> MmioRegisters<'static> {
        unsafe { Self::new_mmio_at(MSC_1_BASE_ADDR) }
    }

    /// Create a new MSC MMIO instance for MSC2 at address [MSC_2_BASE_ADDR].
    ///
    /// # Safety
    ///
    /// See [Self::new_mmio_fixed_0].
    pub const unsafe fn new_mmio_fixed_2() -> MmioRegisters<'static> {
        unsafe { Self::new_mmio_at(MSC_2_BASE_ADDR) }
    }
}
