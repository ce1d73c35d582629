//! # GPIO interrupt controller
//!
//! Interrupt controller facade for one GPIO port: mask, unmask, acknowledge and trigger type
//! selection per pin, and a dispatcher for the pending pins.
//!
//! The hardware has no both-edges trigger. [IrqTrigger::BothEdges] is emulated: the pin is
//! armed for the edge leading away from its current level, and re-armed for the opposite
//! edge every time it fires.
use super::{FlagClear, GpioError, GpioPort, GpioRegisterPort, PinFunction, PinState, pin_bit};

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum IrqTrigger {
    LowLevel,
    HighLevel,
    FallingEdge,
    RisingEdge,
    BothEdges,
}

impl IrqTrigger {
    /// Pin function selecting this trigger. [None] for [IrqTrigger::BothEdges], which depends
    /// on the current pin level.
    pub const fn pin_function(self) -> Option<PinFunction> {
        match self {
            IrqTrigger::LowLevel => Some(PinFunction::LowInt),
            IrqTrigger::HighLevel => Some(PinFunction::HighInt),
            IrqTrigger::FallingEdge => Some(PinFunction::FallInt),
            IrqTrigger::RisingEdge => Some(PinFunction::RaiseInt),
            IrqTrigger::BothEdges => None,
        }
    }
}

pub struct EdgeIrqController<'z, P> {
    port: GpioPort<'z, P>,
    both_edges: u32,
}

impl<'z, P: GpioRegisterPort> EdgeIrqController<'z, P> {
    pub fn new(port: GpioPort<'z, P>) -> Self {
        Self {
            port,
            both_edges: 0,
        }
    }

    #[inline]
    pub fn port(&mut self) -> &mut GpioPort<'z, P> {
        &mut self.port
    }

    pub fn release(self) -> GpioPort<'z, P> {
        self.port
    }

    pub fn unmask(&mut self, pin: u8) -> Result<(), GpioError> {
        self.port.interrupt_enable(pin)
    }

    pub fn mask(&mut self, pin: u8) -> Result<(), GpioError> {
        self.port.interrupt_disable(pin)
    }

    pub fn ack(&mut self, pin: u8) -> Result<FlagClear, GpioError> {
        self.port.interrupt_clear(pin)
    }

    /// Select the trigger of a pin. A pin which is currently a masked interrupt stays masked.
    pub fn set_type(&mut self, pin: u8, trigger: IrqTrigger) -> Result<(), GpioError> {
        let bit = pin_bit(pin)?;
        let function = match trigger.pin_function() {
            Some(function) => function,
            None => self.next_edge(pin)?,
        };
        let masked = self.port.is_interrupt_masked(pin)?;
        if masked {
            self.port.set_function(pin, function.masked())?;
        } else {
            self.port.interrupt_type_set(pin, function)?;
        }
        if trigger == IrqTrigger::BothEdges {
            self.both_edges |= bit;
        } else {
            self.both_edges &= !bit;
        }
        log::debug!("port {:?} pin {}: trigger {:?}", self.port.id(), pin, trigger);
        Ok(())
    }

    /// Acknowledge all pending pins and call `handler` for each of them in ascending pin
    /// order. Returns the bitmask of handled pins.
    pub fn handle_pending(&mut self, mut handler: impl FnMut(u8)) -> Result<u32, GpioError> {
        let pending = self.port.pending_interrupts();
        for pin in 0..32 {
            let bit = 1 << pin;
            if pending & bit == 0 {
                continue;
            }
            self.port.interrupt_clear(pin)?;
            if self.both_edges & bit != 0 {
                let function = self.next_edge(pin)?;
                self.port.set_function(pin, function)?;
            }
            handler(pin);
        }
        Ok(pending)
    }

    fn next_edge(&mut self, pin: u8) -> Result<PinFunction, GpioError> {
        Ok(match self.port.level(pin)? {
            PinState::High => PinFunction::FallInt,
            PinState::Low => PinFunction::RaiseInt,
        })
    }
}
