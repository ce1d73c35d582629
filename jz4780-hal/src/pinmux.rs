//! # Pin multiplexing
//!
//! A [PinGroup] names a set of pins of one port which must all be switched to the same
//! function for a peripheral to work, for example the data and clock lines of an MMC bus.
use crate::gpio::{GpioError, GpioPort, GpioRegisterPort, PinFunction, PortId, pin_bit};

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct PinGroup {
    pub name: &'static str,
    pub port: PortId,
    pub pins: &'static [u8],
    pub function: PinFunction,
}

impl PinGroup {
    pub const fn new(
        name: &'static str,
        port: PortId,
        pins: &'static [u8],
        function: PinFunction,
    ) -> Self {
        Self {
            name,
            port,
            pins,
            function,
        }
    }
}

pub trait PinMux {
    /// Switch all pins of the group to the group function.
    fn apply(&mut self, group: &PinGroup) -> Result<(), GpioError>;
}

impl<P: GpioRegisterPort> PinMux for GpioPort<'_, P> {
    fn apply(&mut self, group: &PinGroup) -> Result<(), GpioError> {
        if group.port != self.id() {
            return Err(GpioError::WrongPort {
                expected: group.port,
                actual: self.id(),
            });
        }
        for pin in group.pins {
            pin_bit(*pin)?;
        }
        for pin in group.pins {
            self.set_function(*pin, group.function)?;
        }
        log::debug!("pin group {} -> {:?}", group.name, group.function);
        Ok(())
    }
}
