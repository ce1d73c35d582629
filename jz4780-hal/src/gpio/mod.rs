//! # GPIO pin controller
//!
//! The JZ4780 has six GPIO ports (A to F) with 32 pins each. The function of a pin is encoded
//! by four latches (interrupt, mask, pattern 1, pattern 0), see [PinFunction] for the
//! encoding.
//!
//! Pin functions are not written to the port directly. They are staged in the GPIOZ
//! broadcast block and committed into the latches of one port with a group load. The GPIOZ
//! staging registers are shared by all ports, so the staging and commit sequence runs under
//! the chip wide lock held by [Gpioz]. Afterwards the latches of the port are read back and
//! compared against the requested function.
//!
//! Mask, flag, level and pull operations use the set/clear registers of the port itself and
//! do not need the lock.
//!
//! ## Example
//!
//! ```no_run
//! use jz4780_hal::gpio::{GpioPort, Gpioz, PinFunction, PortId};
//! use jz4780_hal::pac::gpio::Registers;
//!
//! let gpioz = Gpioz::new(unsafe { Registers::new_mmio_gpioz() }).unwrap();
//! let regs = unsafe { Registers::new_mmio_port(PortId::D.ordinal()) }.unwrap();
//! let mut port_d = GpioPort::new(regs, &gpioz).unwrap();
//! port_d.set_function(13, PinFunction::Output1).unwrap();
//! ```
use core::cell::RefCell;

pub use embedded_hal::digital::PinState;
use jz4780::gpio::{
    GPIO_BASE_ADDR, GPIOZ_BASE_ADDR, NUM_PORTS, PINS_PER_PORT, PORT_STRIDE, group_id_of,
};

pub mod irq;
pub mod ll;

pub use ll::{GpioRegisterPort, Latch};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, num_enum::TryFromPrimitive)]
#[repr(u8)]
pub enum PortId {
    A = 0,
    B = 1,
    C = 2,
    D = 3,
    E = 4,
    F = 5,
}

impl PortId {
    pub const ALL: [PortId; NUM_PORTS] = [
        PortId::A,
        PortId::B,
        PortId::C,
        PortId::D,
        PortId::E,
        PortId::F,
    ];

    #[inline]
    pub const fn ordinal(self) -> usize {
        self as usize
    }

    #[inline]
    pub const fn base_addr(self) -> usize {
        GPIO_BASE_ADDR + self.ordinal() * PORT_STRIDE
    }

    /// Port located at the given base address.
    pub fn from_base_addr(addr: usize) -> Option<Self> {
        Self::ALL.into_iter().find(|id| id.base_addr() == addr)
    }

    /// Group id used to commit staged GPIOZ values into this port.
    #[inline]
    pub const fn group_id(self) -> u8 {
        group_id_of(self.base_addr())
    }

    /// Global number of pin 0 of this port.
    #[inline]
    pub const fn number_base(self) -> u32 {
        (self.ordinal() * PINS_PER_PORT) as u32
    }

    pub fn from_number_base(base: u32) -> Result<Self, GpioError> {
        if base % PINS_PER_PORT as u32 != 0 {
            return Err(GpioError::InvalidPinNumber(base));
        }
        u8::try_from(base / PINS_PER_PORT as u32)
            .ok()
            .and_then(|ordinal| Self::try_from(ordinal).ok())
            .ok_or(GpioError::InvalidPinNumber(base))
    }
}

/// A pin identified by its port and its index inside the port.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct GlobalPin {
    port: PortId,
    pin: u8,
}

impl GlobalPin {
    pub fn new(port: PortId, pin: u8) -> Result<Self, GpioError> {
        pin_bit(pin)?;
        Ok(Self { port, pin })
    }

    pub fn from_number(number: u32) -> Result<Self, GpioError> {
        let port = PortId::from_number_base(number - number % PINS_PER_PORT as u32)
            .map_err(|_| GpioError::InvalidPinNumber(number))?;
        Ok(Self {
            port,
            pin: (number % PINS_PER_PORT as u32) as u8,
        })
    }

    #[inline]
    pub const fn port(&self) -> PortId {
        self.port
    }

    #[inline]
    pub const fn pin(&self) -> u8 {
        self.pin
    }

    #[inline]
    pub const fn number(&self) -> u32 {
        self.port.number_base() + self.pin as u32
    }
}

/// Pin functions. The four latch values of each function are listed in the table below.
///
/// | Function  | Int | Mask | Pat1 | Pat0 |
/// |-----------|-----|------|------|------|
/// | Device0   | 0 | 0 | 0 | 0 |
/// | Device1   | 0 | 0 | 0 | 1 |
/// | Device2   | 0 | 0 | 1 | 0 |
/// | Device3   | 0 | 0 | 1 | 1 |
/// | Output0   | 0 | 1 | 0 | 0 |
/// | Output1   | 0 | 1 | 0 | 1 |
/// | Input     | 0 | 1 | 1 | 1 |
/// | LowInt    | 1 | 1 | 0 | 0 |
/// | HighInt   | 1 | 1 | 0 | 1 |
/// | FallInt   | 1 | 1 | 1 | 0 |
/// | RaiseInt  | 1 | 1 | 1 | 1 |
/// | LowIntM   | 1 | 0 | 0 | 0 |
/// | HighIntM  | 1 | 0 | 0 | 1 |
/// | FallIntM  | 1 | 0 | 1 | 0 |
/// | RaiseIntM | 1 | 0 | 1 | 1 |
///
/// The interrupt functions come in an unmasked and a masked (`M` suffix) variant. The mask
/// latch is 1 when the interrupt is delivered.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, num_enum::TryFromPrimitive)]
#[repr(u8)]
pub enum PinFunction {
    Device0 = 0,
    Device1 = 1,
    Device2 = 2,
    Device3 = 3,
    Output0 = 4,
    Output1 = 5,
    Input = 6,
    LowInt = 7,
    HighInt = 8,
    FallInt = 9,
    RaiseInt = 10,
    LowIntM = 11,
    HighIntM = 12,
    FallIntM = 13,
    RaiseIntM = 14,
}

/// Values of the four configuration latches of one pin.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct LatchValues {
    pub interrupt: bool,
    pub mask: bool,
    pub pattern1: bool,
    pub pattern0: bool,
}

impl LatchValues {
    const fn new(interrupt: u8, mask: u8, pattern1: u8, pattern0: u8) -> Self {
        Self {
            interrupt: interrupt != 0,
            mask: mask != 0,
            pattern1: pattern1 != 0,
            pattern0: pattern0 != 0,
        }
    }

    #[inline]
    pub const fn get(&self, latch: Latch) -> bool {
        match latch {
            Latch::Interrupt => self.interrupt,
            Latch::Mask => self.mask,
            Latch::Pattern1 => self.pattern1,
            Latch::Pattern0 => self.pattern0,
        }
    }
}

const FUNCTION_LATCHES: [LatchValues; 15] = [
    LatchValues::new(0, 0, 0, 0),
    LatchValues::new(0, 0, 0, 1),
    LatchValues::new(0, 0, 1, 0),
    LatchValues::new(0, 0, 1, 1),
    LatchValues::new(0, 1, 0, 0),
    LatchValues::new(0, 1, 0, 1),
    LatchValues::new(0, 1, 1, 1),
    LatchValues::new(1, 1, 0, 0),
    LatchValues::new(1, 1, 0, 1),
    LatchValues::new(1, 1, 1, 0),
    LatchValues::new(1, 1, 1, 1),
    LatchValues::new(1, 0, 0, 0),
    LatchValues::new(1, 0, 0, 1),
    LatchValues::new(1, 0, 1, 0),
    LatchValues::new(1, 0, 1, 1),
];

impl PinFunction {
    pub const ALL: [PinFunction; 15] = [
        PinFunction::Device0,
        PinFunction::Device1,
        PinFunction::Device2,
        PinFunction::Device3,
        PinFunction::Output0,
        PinFunction::Output1,
        PinFunction::Input,
        PinFunction::LowInt,
        PinFunction::HighInt,
        PinFunction::FallInt,
        PinFunction::RaiseInt,
        PinFunction::LowIntM,
        PinFunction::HighIntM,
        PinFunction::FallIntM,
        PinFunction::RaiseIntM,
    ];

    pub fn from_raw(raw: u8) -> Result<Self, GpioError> {
        Self::try_from(raw).map_err(|_| GpioError::InvalidFunction(raw))
    }

    #[inline]
    pub const fn latches(self) -> LatchValues {
        FUNCTION_LATCHES[self as usize]
    }

    /// Decode latch values. Returns [None] for the one unused combination.
    pub fn from_latches(latches: LatchValues) -> Option<Self> {
        Self::ALL.into_iter().find(|f| f.latches() == latches)
    }

    /// True for the four unmasked interrupt trigger types.
    #[inline]
    pub const fn is_interrupt_type(self) -> bool {
        matches!(
            self,
            PinFunction::LowInt
                | PinFunction::HighInt
                | PinFunction::FallInt
                | PinFunction::RaiseInt
        )
    }

    /// Masked variant of an interrupt trigger type. Other functions are returned unchanged.
    pub const fn masked(self) -> Self {
        match self {
            PinFunction::LowInt => PinFunction::LowIntM,
            PinFunction::HighInt => PinFunction::HighIntM,
            PinFunction::FallInt => PinFunction::FallIntM,
            PinFunction::RaiseInt => PinFunction::RaiseIntM,
            other => other,
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GpioError {
    #[error("pin {0} is out of range, ports have 32 pins")]
    InvalidPin(u8),
    #[error("raw value {0} is not a pin function")]
    InvalidFunction(u8),
    #[error("pin number {0} does not map to a GPIO port")]
    InvalidPinNumber(u32),
    #[error("address {0:#010x} is not a GPIO port base address")]
    InvalidBaseAddress(usize),
    #[error("{0:?} is not an interrupt trigger type")]
    NotAnInterruptType(PinFunction),
    #[error("port {port:?} pin {pin}: latch read back does not match the written value")]
    VerifyFailed { port: PortId, pin: u8 },
    #[error("pin group for port {expected:?} applied to port {actual:?}")]
    WrongPort { expected: PortId, actual: PortId },
}

impl embedded_hal::digital::Error for GpioError {
    fn kind(&self) -> embedded_hal::digital::ErrorKind {
        embedded_hal::digital::ErrorKind::Other
    }
}

/// Result of [GpioPort::interrupt_clear].
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum FlagClear {
    Cleared,
    /// The flag was not set, nothing was written.
    NotPending,
}

#[inline]
pub(crate) fn pin_bit(pin: u8) -> Result<u32, GpioError> {
    if pin as usize >= PINS_PER_PORT {
        return Err(GpioError::InvalidPin(pin));
    }
    Ok(1 << pin)
}

/// The GPIOZ broadcast block together with the lock serializing its use.
///
/// One instance is shared by all [GpioPort] drivers of the chip.
pub struct Gpioz<P> {
    regs: critical_section::Mutex<RefCell<P>>,
}

// Safety: The register port is only accessed inside a critical section, and it may be moved
// to the thread doing so.
unsafe impl<P: GpioRegisterPort + Send> Sync for Gpioz<P> {}

impl<P: GpioRegisterPort> Gpioz<P> {
    pub fn new(regs: P) -> Result<Self, GpioError> {
        let base_addr = regs.base_addr();
        if base_addr != GPIOZ_BASE_ADDR {
            return Err(GpioError::InvalidBaseAddress(base_addr));
        }
        Ok(Self {
            regs: critical_section::Mutex::new(RefCell::new(regs)),
        })
    }

    /// Stage the latch values for the pins in `pins` and commit them into the port with the
    /// given group id.
    fn stage_and_load(&self, group_id: u8, pins: u32, latches: LatchValues) {
        critical_section::with(|cs| {
            let mut regs = self.regs.borrow_ref_mut(cs);
            for latch in Latch::ALL {
                if latches.get(latch) {
                    regs.set_latch_bits(latch, pins);
                } else {
                    regs.clear_latch_bits(latch, pins);
                }
            }
            regs.load_group(group_id);
        });
    }
}

/// Driver for one GPIO port.
pub struct GpioPort<'z, P> {
    id: PortId,
    regs: P,
    gpioz: &'z Gpioz<P>,
}

impl<'z, P: GpioRegisterPort> GpioPort<'z, P> {
    pub fn new(regs: P, gpioz: &'z Gpioz<P>) -> Result<Self, GpioError> {
        let base_addr = regs.base_addr();
        let id = PortId::from_base_addr(base_addr).ok_or(GpioError::InvalidBaseAddress(base_addr))?;
        Ok(Self { id, regs, gpioz })
    }

    #[inline]
    pub fn id(&self) -> PortId {
        self.id
    }

    /// Program the function of a pin.
    ///
    /// Other pins of the port and other ports are not affected.
    pub fn set_function(&mut self, pin: u8, function: PinFunction) -> Result<(), GpioError> {
        let bit = pin_bit(pin)?;
        let latches = function.latches();
        self.gpioz.stage_and_load(self.id.group_id(), bit, latches);
        if self.read_latches(bit) != latches {
            log::warn!(
                "port {:?} pin {}: {:?} did not stick",
                self.id,
                pin,
                function
            );
            return Err(GpioError::VerifyFailed { port: self.id, pin });
        }
        log::trace!("port {:?} pin {} -> {:?}", self.id, pin, function);
        Ok(())
    }

    /// Current function of a pin, or [None] if the latches hold the unused combination.
    pub fn function(&mut self, pin: u8) -> Result<Option<PinFunction>, GpioError> {
        let bit = pin_bit(pin)?;
        Ok(PinFunction::from_latches(self.read_latches(bit)))
    }

    /// Let the interrupt of a pin through by setting its mask latch.
    pub fn interrupt_enable(&mut self, pin: u8) -> Result<(), GpioError> {
        let bit = pin_bit(pin)?;
        self.regs.set_latch_bits(Latch::Mask, bit);
        let ok = self.regs.latch(Latch::Mask) & bit != 0;
        self.verify(pin, ok)
    }

    pub fn interrupt_disable(&mut self, pin: u8) -> Result<(), GpioError> {
        let bit = pin_bit(pin)?;
        self.regs.clear_latch_bits(Latch::Mask, bit);
        let ok = self.regs.latch(Latch::Mask) & bit == 0;
        self.verify(pin, ok)
    }

    /// Clear the interrupt flag of a pin if it is set.
    pub fn interrupt_clear(&mut self, pin: u8) -> Result<FlagClear, GpioError> {
        let bit = pin_bit(pin)?;
        if self.regs.flags() & bit == 0 {
            return Ok(FlagClear::NotPending);
        }
        self.regs.clear_flags(bit);
        let ok = self.regs.flags() & bit == 0;
        self.verify(pin, ok)?;
        Ok(FlagClear::Cleared)
    }

    /// Select the trigger type of a pin. Only the four unmasked interrupt functions are
    /// accepted.
    pub fn interrupt_type_set(&mut self, pin: u8, trigger: PinFunction) -> Result<(), GpioError> {
        if !trigger.is_interrupt_type() {
            return Err(GpioError::NotAnInterruptType(trigger));
        }
        self.set_function(pin, trigger)
    }

    /// Pins which have their flag set and their interrupt delivered.
    pub fn pending_interrupts(&mut self) -> u32 {
        self.regs.flags() & self.regs.latch(Latch::Mask) & self.regs.latch(Latch::Interrupt)
    }

    /// True if the pin is configured as an interrupt and masked.
    pub fn is_interrupt_masked(&mut self, pin: u8) -> Result<bool, GpioError> {
        let bit = pin_bit(pin)?;
        Ok(self.regs.latch(Latch::Interrupt) & bit != 0 && self.regs.latch(Latch::Mask) & bit == 0)
    }

    pub fn level(&mut self, pin: u8) -> Result<PinState, GpioError> {
        let bit = pin_bit(pin)?;
        Ok(PinState::from(self.regs.pin_levels() & bit != 0))
    }

    /// Connect the pull resistor of a pin.
    pub fn pull_enable(&mut self, pin: u8) -> Result<(), GpioError> {
        let bit = pin_bit(pin)?;
        self.regs.clear_pull_disable_bits(bit);
        let ok = self.regs.pull_disabled() & bit == 0;
        self.verify(pin, ok)
    }

    pub fn pull_disable(&mut self, pin: u8) -> Result<(), GpioError> {
        let bit = pin_bit(pin)?;
        self.regs.set_pull_disable_bits(bit);
        let ok = self.regs.pull_disabled() & bit != 0;
        self.verify(pin, ok)
    }

    /// Single pin view implementing the [embedded_hal::digital] traits.
    pub fn pin(&mut self, pin: u8) -> Result<Pin<'_, 'z, P>, GpioError> {
        pin_bit(pin)?;
        Ok(Pin { port: self, pin })
    }

    fn read_latches(&mut self, bit: u32) -> LatchValues {
        LatchValues {
            interrupt: self.regs.latch(Latch::Interrupt) & bit != 0,
            mask: self.regs.latch(Latch::Mask) & bit != 0,
            pattern1: self.regs.latch(Latch::Pattern1) & bit != 0,
            pattern0: self.regs.latch(Latch::Pattern0) & bit != 0,
        }
    }

    fn verify(&self, pin: u8, ok: bool) -> Result<(), GpioError> {
        if !ok {
            log::warn!("port {:?} pin {}: read back mismatch", self.id, pin);
            return Err(GpioError::VerifyFailed { port: self.id, pin });
        }
        Ok(())
    }
}

/// A single pin of a [GpioPort].
///
/// Driving the pin selects [PinFunction::Output0] or [PinFunction::Output1].
pub struct Pin<'a, 'z, P> {
    port: &'a mut GpioPort<'z, P>,
    pin: u8,
}

impl<P: GpioRegisterPort> Pin<'_, '_, P> {
    pub fn set_function(&mut self, function: PinFunction) -> Result<(), GpioError> {
        self.port.set_function(self.pin, function)
    }
}

impl<P> embedded_hal::digital::ErrorType for Pin<'_, '_, P> {
    type Error = GpioError;
}

impl<P: GpioRegisterPort> embedded_hal::digital::InputPin for Pin<'_, '_, P> {
    fn is_high(&mut self) -> Result<bool, Self::Error> {
        Ok(self.port.level(self.pin)? == PinState::High)
    }

    fn is_low(&mut self) -> Result<bool, Self::Error> {
        Ok(self.port.level(self.pin)? == PinState::Low)
    }
}

impl<P: GpioRegisterPort> embedded_hal::digital::OutputPin for Pin<'_, '_, P> {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        self.port.set_function(self.pin, PinFunction::Output0)
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        self.port.set_function(self.pin, PinFunction::Output1)
    }
}

impl<P: GpioRegisterPort> embedded_hal::digital::StatefulOutputPin for Pin<'_, '_, P> {
    fn is_set_high(&mut self) -> Result<bool, Self::Error> {
        Ok(self.port.function(self.pin)? == Some(PinFunction::Output1))
    }

    fn is_set_low(&mut self) -> Result<bool, Self::Error> {
        Ok(self.port.function(self.pin)? == Some(PinFunction::Output0))
    }
}
