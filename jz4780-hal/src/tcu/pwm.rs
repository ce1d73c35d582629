//! # PWM output of the TCU channels
//!
//! A [PwmChannel] drives the output of one [TimerChannel] either from its compare registers
//! ([PwmChannel::configure]) or, for channels 0, 3, 4 and 5, from the channel FIFO which
//! feeds a sequence of (duty, period) pairs into the compare registers
//! ([PwmChannel::configure_fifo_mode1] and [PwmChannel::configure_fifo_mode2]).
use core::convert::Infallible;

use embedded_hal::digital::PinState;
use jz4780::tcu::{ChannelControl, FIFO_DEPTH, FifoControl, FifoMode, Prescale};

use super::{Channel, TcuRegisterPort, TimerChannel};
use crate::gpio::{GpioError, PinFunction, PortId};
use crate::pinmux::{PinGroup, PinMux};
use crate::time::Hertz;

/// PWM output pin of every channel.
pub const PWM_PIN_GROUPS: [PinGroup; 8] = [
    PinGroup::new("pwm0", PortId::E, &[0], PinFunction::Device0),
    PinGroup::new("pwm1", PortId::E, &[1], PinFunction::Device0),
    PinGroup::new("pwm2", PortId::E, &[2], PinFunction::Device0),
    PinGroup::new("pwm3", PortId::E, &[3], PinFunction::Device0),
    PinGroup::new("pwm4", PortId::E, &[4], PinFunction::Device0),
    PinGroup::new("pwm5", PortId::E, &[5], PinFunction::Device0),
    PinGroup::new("pwm6", PortId::E, &[6], PinFunction::Device0),
    PinGroup::new("pwm7", PortId::E, &[7], PinFunction::Device0),
];

/// Behaviour of the output when the PWM is disabled.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub enum Shutdown {
    /// Finish the current period first.
    #[default]
    Graceful,
    Abrupt,
}

#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub enum ClockInput {
    #[default]
    Pclk,
    Rtc,
    Ext,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct PwmConfig {
    /// Output level while the counter is below the duty value.
    pub initial_level: PinState,
    pub shutdown: Shutdown,
    pub prescale: Prescale,
    pub clock: ClockInput,
}

impl Default for PwmConfig {
    fn default() -> Self {
        Self {
            initial_level: PinState::Low,
            shutdown: Shutdown::Graceful,
            prescale: Prescale::Div1,
            clock: ClockInput::Pclk,
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PwmError {
    #[error("period is zero")]
    ZeroPeriod,
    #[error("duty {duty} exceeds period {period}")]
    DutyExceedsPeriod { duty: u16, period: u16 },
    #[error("frequency is zero")]
    FrequencyIsZero,
    #[error("frequency {0} Hz is too low for the 16-bit counter")]
    FrequencyTooLow(u32),
    #[error("duty and period lists differ in length")]
    LengthMismatch,
    #[error("{0} FIFO entries, 1 to 16 are supported")]
    InvalidFifoLength(usize),
    #[error("zero duty or period at FIFO entry {index}")]
    ZeroValue { index: usize },
    #[error("cycle count is zero")]
    ZeroCycles,
    #[error("channel {0:?} has no FIFO")]
    NoFifo(Channel),
    #[error("pin mux error: {0}")]
    PinMux(#[from] GpioError),
}

impl embedded_hal::pwm::Error for PwmError {
    fn kind(&self) -> embedded_hal::pwm::ErrorKind {
        embedded_hal::pwm::ErrorKind::Other
    }
}

/// Smallest prescaler for which the period of `freq` fits into the 16-bit counter, together
/// with that period in counter ticks.
///
/// Returns [PwmError::FrequencyTooLow] if the period does not fit even with the largest
/// prescaler.
pub fn calc_prescale_and_period(ref_clk: Hertz, freq: Hertz) -> Result<(Prescale, u16), PwmError> {
    if freq.raw() == 0 {
        return Err(PwmError::FrequencyIsZero);
    }
    const DIVIDERS: [(Prescale, u32); 6] = [
        (Prescale::Div1, 1),
        (Prescale::Div4, 4),
        (Prescale::Div16, 16),
        (Prescale::Div64, 64),
        (Prescale::Div256, 256),
        (Prescale::Div1024, 1024),
    ];
    for (prescale, div) in DIVIDERS {
        let ticks = ref_clk.raw() / div / freq.raw();
        if ticks <= u16::MAX as u32 {
            return Ok((prescale, ticks.max(1) as u16));
        }
    }
    Err(PwmError::FrequencyTooLow(freq.raw()))
}

pub struct PwmChannel<P> {
    timer: TimerChannel<P>,
    config: PwmConfig,
    period: u16,
    /// Set once the FIFO mode has been set up. The FIFO may hold entries from then on, so
    /// later FIFO setups tear the old one down first and skip the pin mux.
    armed: bool,
}

impl<P: TcuRegisterPort> PwmChannel<P> {
    pub fn new(timer: TimerChannel<P>, config: PwmConfig) -> Self {
        Self {
            timer,
            config,
            period: 0,
            armed: false,
        }
    }

    #[inline]
    pub fn id(&self) -> Channel {
        self.timer.id()
    }

    #[inline]
    pub fn config(&self) -> &PwmConfig {
        &self.config
    }

    /// True once a FIFO mode was set up on this channel.
    #[inline]
    pub fn is_fifo_armed(&self) -> bool {
        self.armed
    }

    /// Number of entries left in the channel FIFO, [None] for channels without one.
    pub fn fifo_level(&mut self) -> Option<u8> {
        let id = self.timer.id();
        id.has_fifo().then(|| self.timer.regs_mut().fifo_level(id))
    }

    #[inline]
    pub fn timer_mut(&mut self) -> &mut TimerChannel<P> {
        &mut self.timer
    }

    pub fn release(self) -> TimerChannel<P> {
        self.timer
    }

    /// Set up the compare registers for a fixed waveform. The counter is not started, use
    /// [Self::enable] for that.
    pub fn configure(&mut self, duty: u16, period: u16) -> Result<(), PwmError> {
        if period == 0 {
            return Err(PwmError::ZeroPeriod);
        }
        if duty > period {
            return Err(PwmError::DutyExceedsPeriod { duty, period });
        }
        let id = self.timer.id();
        let config = self.config;
        self.timer
            .modify_control(|ctrl| ctrl.with_initial_level_high(config.initial_level == PinState::High));
        self.timer
            .modify_control(|ctrl| ctrl.with_abrupt_shutdown(config.shutdown == Shutdown::Abrupt));
        self.timer
            .modify_control(|ctrl| ctrl.with_prescale(config.prescale));
        let regs = self.timer.regs_mut();
        regs.write_counter(id, 0);
        regs.write_half(id, duty);
        regs.write_full(id, period);
        if id.has_fifo() {
            // Entries of an earlier FIFO setup must not be replayed later.
            regs.write_fifo_control(
                id,
                FifoControl::new_with_raw_value(0)
                    .with_mode(FifoMode::NonFifo)
                    .with_clear(self.armed),
            );
        }
        self.timer.modify_control(|ctrl| ctrl.with_pwm_enable(true));
        self.timer
            .modify_control(|ctrl| select_clock(ctrl, config.clock));
        self.timer.supply_clock();
        self.period = period;
        log::debug!("pwm {:?}: duty {} period {}", id, duty, period);
        Ok(())
    }

    /// Pick the prescaler and period for the given output frequency and configure the
    /// channel with it. This resets the duty cycle to 0 %.
    pub fn configure_frequency(&mut self, ref_clk: Hertz, freq: Hertz) -> Result<(), PwmError> {
        let (prescale, period) = calc_prescale_and_period(ref_clk, freq)?;
        self.config.prescale = prescale;
        self.configure(0, period)
    }

    /// Start the counter.
    #[inline]
    pub fn enable(&mut self) {
        self.timer.start();
    }

    /// Stop the counter and the PWM output.
    pub fn disable(&mut self) {
        self.timer.stop();
        self.timer.modify_control(|ctrl| ctrl.with_pwm_enable(false));
    }

    /// Play the given (duty, period) sequence once.
    pub fn configure_fifo_mode1(
        &mut self,
        mux: &mut impl PinMux,
        duties: &[u16],
        periods: &[u16],
    ) -> Result<(), PwmError> {
        self.configure_fifo(mux, duties, periods, None)
    }

    /// Replay the given (duty, period) sequence `cycles` times.
    pub fn configure_fifo_mode2(
        &mut self,
        mux: &mut impl PinMux,
        duties: &[u16],
        periods: &[u16],
        cycles: u32,
    ) -> Result<(), PwmError> {
        self.configure_fifo(mux, duties, periods, Some(cycles))
    }

    fn validate_fifo(
        &self,
        duties: &[u16],
        periods: &[u16],
        cycles: Option<u32>,
    ) -> Result<(), PwmError> {
        let id = self.timer.id();
        if !id.has_fifo() {
            return Err(PwmError::NoFifo(id));
        }
        if duties.len() != periods.len() {
            return Err(PwmError::LengthMismatch);
        }
        if duties.is_empty() || duties.len() > FIFO_DEPTH {
            return Err(PwmError::InvalidFifoLength(duties.len()));
        }
        if let Some(index) = duties
            .iter()
            .zip(periods)
            .position(|(duty, period)| *duty == 0 || *period == 0)
        {
            return Err(PwmError::ZeroValue { index });
        }
        if cycles == Some(0) {
            return Err(PwmError::ZeroCycles);
        }
        Ok(())
    }

    fn configure_fifo(
        &mut self,
        mux: &mut impl PinMux,
        duties: &[u16],
        periods: &[u16],
        cycles: Option<u32>,
    ) -> Result<(), PwmError> {
        self.validate_fifo(duties, periods, cycles)?;
        let id = self.timer.id();
        let config = self.config;
        if self.armed {
            self.timer.modify_control(|ctrl| ctrl.with_pwm_enable(false));
            self.timer.clear_match_flags();
            let regs = self.timer.regs_mut();
            let fifo_ctrl = regs.fifo_control(id);
            regs.write_fifo_control(id, fifo_ctrl.with_clear(true));
        } else {
            mux.apply(&PWM_PIN_GROUPS[id as usize])?;
            self.timer.modify_control(|ctrl| {
                select_clock(
                    ctrl.with_initial_level_high(config.initial_level == PinState::High)
                        .with_abrupt_shutdown(config.shutdown == Shutdown::Abrupt)
                        .with_prescale(config.prescale),
                    config.clock,
                )
            });
            self.timer.regs_mut().write_counter(id, 0);
        }

        let regs = self.timer.regs_mut();
        for (duty, period) in duties.iter().zip(periods) {
            regs.push_fifo(id, ((*period as u32) << 16) | *duty as u32);
        }
        let mode = if cycles.is_some() {
            FifoMode::Mode2
        } else {
            FifoMode::Mode1
        };
        let fifo_ctrl = FifoControl::new_with_raw_value(0).with_mode(mode);
        regs.write_fifo_control(id, fifo_ctrl);
        if let Some(cycles) = cycles {
            regs.write_fifo_cycles(id, cycles);
        }
        regs.write_fifo_control(
            id,
            fifo_ctrl.with_depth(arbitrary_int::u5::new(duties.len() as u8)),
        );
        self.timer.modify_control(|ctrl| ctrl.with_pwm_enable(true));
        self.timer.supply_clock();
        self.timer.start();
        self.period = periods[periods.len() - 1];
        self.armed = true;
        log::debug!(
            "pwm {:?}: {:?} with {} entries, cycles {:?}",
            id,
            mode,
            duties.len(),
            cycles
        );
        Ok(())
    }
}

fn select_clock(ctrl: ChannelControl, clock: ClockInput) -> ChannelControl {
    ctrl.with_pclk_enable(clock == ClockInput::Pclk)
        .with_rtc_enable(clock == ClockInput::Rtc)
        .with_ext_enable(clock == ClockInput::Ext)
}

impl<P> embedded_hal::pwm::ErrorType for PwmChannel<P> {
    type Error = Infallible;
}

impl<P: TcuRegisterPort> embedded_hal::pwm::SetDutyCycle for PwmChannel<P> {
    #[inline]
    fn max_duty_cycle(&self) -> u16 {
        self.period.max(1)
    }

    #[inline]
    fn set_duty_cycle(&mut self, duty: u16) -> Result<(), Self::Error> {
        let id = self.timer.id();
        let duty = duty.min(self.period);
        self.timer.regs_mut().write_half(id, duty);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use embedded_hal::pwm::SetDutyCycle;
    use std::vec::Vec;

    use super::*;
    use crate::gpio::{GpioPort, Gpioz};
    use crate::sim::{SimGpio, SimTcu, TcuWrite};
    use crate::tcu::Tcu;

    struct NoMux;

    impl PinMux for NoMux {
        fn apply(&mut self, _group: &PinGroup) -> Result<(), GpioError> {
            Ok(())
        }
    }

    fn pwm(sim: &SimTcu, id: Channel, config: PwmConfig) -> PwmChannel<crate::sim::SimTcuPort> {
        PwmChannel::new(TimerChannel::new(sim.port(), id).unwrap(), config)
    }

    #[test]
    fn prescale_selection() {
        let clk = Hertz::from_raw(48_000_000);
        assert_eq!(
            calc_prescale_and_period(clk, Hertz::from_raw(1_000)),
            Ok((Prescale::Div1, 48_000))
        );
        assert_eq!(
            calc_prescale_and_period(clk, Hertz::from_raw(100)),
            Ok((Prescale::Div16, 30_000))
        );
        assert_eq!(
            calc_prescale_and_period(clk, Hertz::from_raw(0)),
            Err(PwmError::FrequencyIsZero)
        );
        assert_eq!(
            calc_prescale_and_period(clk, Hertz::from_raw(1)),
            Ok((Prescale::Div1024, 46_875))
        );
        // 200 MHz / 1024 needs at least 3 Hz to fit.
        let fast_clk = Hertz::from_raw(200_000_000);
        assert_eq!(
            calc_prescale_and_period(fast_clk, Hertz::from_raw(2)),
            Err(PwmError::FrequencyTooLow(2))
        );
        assert_eq!(
            calc_prescale_and_period(fast_clk, Hertz::from_raw(3)),
            Ok((Prescale::Div1024, 65_104))
        );
    }

    #[test]
    fn configure_write_order() {
        let sim = SimTcu::new();
        let config = PwmConfig {
            initial_level: PinState::High,
            shutdown: Shutdown::Abrupt,
            prescale: Prescale::Div16,
            clock: ClockInput::Ext,
        };
        let mut pwm = pwm(&sim, Channel::Ch3, config);
        pwm.configure(250, 1000).unwrap();

        let level = ChannelControl::new_with_raw_value(0).with_initial_level_high(true);
        let shutdown = level.with_abrupt_shutdown(true);
        let prescale = shutdown.with_prescale(Prescale::Div16);
        let enabled = prescale.with_pwm_enable(true);
        let clocked = enabled.with_ext_enable(true);
        let ch = Channel::Ch3;
        assert_eq!(
            sim.writes(),
            [
                TcuWrite::Control(ch, level.raw_value()),
                TcuWrite::Control(ch, shutdown.raw_value()),
                TcuWrite::Control(ch, prescale.raw_value()),
                TcuWrite::Counter(ch, 0),
                TcuWrite::Half(ch, 250),
                TcuWrite::Full(ch, 1000),
                TcuWrite::FifoControl(ch, 0),
                TcuWrite::Control(ch, enabled.raw_value()),
                TcuWrite::Control(ch, clocked.raw_value()),
                TcuWrite::StopClear(1 << 3),
            ]
        );
        assert_eq!(sim.enabled(), 0);
        pwm.enable();
        assert_eq!(sim.enabled(), 1 << 3);
        pwm.disable();
        assert_eq!(sim.enabled(), 0);
        assert!(!sim.control(ch).pwm_enable());
    }

    #[test]
    fn configure_without_fifo() {
        let sim = SimTcu::new();
        let mut pwm = pwm(&sim, Channel::Ch1, PwmConfig::default());
        pwm.configure(0, 10).unwrap();
        assert!(
            !sim.writes()
                .iter()
                .any(|w| matches!(w, TcuWrite::FifoControl(..)))
        );
        let ctrl = sim.control(Channel::Ch1);
        assert!(ctrl.pwm_enable());
        assert!(ctrl.pclk_enable());
        assert!(!ctrl.initial_level_high());
        assert_eq!(sim.compare(Channel::Ch1), (10, 0));
    }

    #[test]
    fn invalid_waveform() {
        let sim = SimTcu::new();
        let mut pwm = pwm(&sim, Channel::Ch2, PwmConfig::default());
        assert_eq!(pwm.configure(1, 0), Err(PwmError::ZeroPeriod));
        assert_eq!(
            pwm.configure(11, 10),
            Err(PwmError::DutyExceedsPeriod {
                duty: 11,
                period: 10
            })
        );
        assert!(sim.writes().is_empty());
    }

    #[test]
    fn duty_cycle_trait() {
        let sim = SimTcu::new();
        let mut pwm = pwm(&sim, Channel::Ch6, PwmConfig::default());
        assert_eq!(pwm.max_duty_cycle(), 1);
        pwm.configure_frequency(Hertz::from_raw(12_000_000), Hertz::from_raw(1_000))
            .unwrap();
        assert_eq!(pwm.max_duty_cycle(), 12_000);
        pwm.set_duty_cycle_percent(25).unwrap();
        assert_eq!(sim.compare(Channel::Ch6), (12_000, 3_000));
        pwm.set_duty_cycle_fully_on().unwrap();
        assert_eq!(sim.compare(Channel::Ch6), (12_000, 12_000));
    }

    #[test]
    fn fifo_mode1_first_arm() {
        let tcu_sim = SimTcu::new();
        let gpio_sim = SimGpio::new();
        let gpioz = Gpioz::new(gpio_sim.gpioz()).unwrap();
        let mut port_e = GpioPort::new(gpio_sim.port(PortId::E), &gpioz).unwrap();
        port_e.set_function(4, PinFunction::Input).unwrap();

        let Tcu { ch4, .. } = Tcu::new(tcu_sim.port()).unwrap();
        let mut pwm = PwmChannel::new(ch4, PwmConfig::default());
        pwm.configure_fifo_mode1(&mut port_e, &[10, 20, 30], &[100, 200, 300])
            .unwrap();

        assert_eq!(port_e.function(4).unwrap(), Some(PinFunction::Device0));
        let ch = Channel::Ch4;
        assert_eq!(
            tcu_sim.fifo_entries(ch),
            [(100 << 16) | 10, (200 << 16) | 20, (300 << 16) | 30]
        );
        let fifo_ctrl = tcu_sim.fifo_control(ch);
        assert_eq!(fifo_ctrl.mode(), FifoMode::Mode1);
        assert_eq!(fifo_ctrl.depth().value(), 3);
        assert!(tcu_sim.control(ch).pwm_enable());
        assert!(tcu_sim.control(ch).pclk_enable());
        assert_eq!(tcu_sim.enabled(), ch.mask());
        assert_eq!(tcu_sim.stopped() & ch.mask(), 0);
        assert!(
            !tcu_sim
                .writes()
                .iter()
                .any(|w| matches!(w, TcuWrite::FifoCycles(..)))
        );
        assert!(pwm.is_fifo_armed());
    }

    #[test]
    fn fifo_mode2_rearm_tears_down_first() {
        let tcu_sim = SimTcu::new();
        let gpio_sim = SimGpio::new();
        let gpioz = Gpioz::new(gpio_sim.gpioz()).unwrap();
        let mut port_e = GpioPort::new(gpio_sim.port(PortId::E), &gpioz).unwrap();
        let mut pwm = pwm(&tcu_sim, Channel::Ch0, PwmConfig::default());
        let ch = Channel::Ch0;

        pwm.configure_fifo_mode2(&mut port_e, &[1, 2], &[4, 8], 5)
            .unwrap();
        assert_eq!(tcu_sim.fifo_cycles(ch), 5);
        assert_eq!(tcu_sim.fifo_control(ch).mode(), FifoMode::Mode2);
        let group_loads = gpio_sim.group_loads().len();
        assert_eq!(group_loads, 1);

        tcu_sim.set_flags(ch.flag_bits());
        tcu_sim.clear_writes();
        pwm.configure_fifo_mode2(&mut port_e, &[3], &[9], 7)
            .unwrap();

        let writes = tcu_sim.writes();
        let pwm_off = match writes[0] {
            TcuWrite::Control(c, raw) if c == ch => ChannelControl::new_with_raw_value(raw),
            other => panic!("unexpected first write {:?}", other),
        };
        assert!(!pwm_off.pwm_enable());
        assert_eq!(writes[1], TcuWrite::FlagsClear(ch.flag_bits()));
        let clear = match writes[2] {
            TcuWrite::FifoControl(c, raw) if c == ch => FifoControl::new_with_raw_value(raw),
            other => panic!("unexpected third write {:?}", other),
        };
        assert!(clear.clear());
        assert_eq!(writes[3], TcuWrite::FifoPush(ch, (9 << 16) | 3));
        assert!(writes.contains(&TcuWrite::FifoCycles(ch, 7)));

        assert_eq!(tcu_sim.flags(), 0);
        assert_eq!(tcu_sim.fifo_entries(ch), [(9 << 16) | 3]);
        assert_eq!(tcu_sim.fifo_control(ch).depth().value(), 1);
        assert!(tcu_sim.control(ch).pwm_enable());
        assert_eq!(gpio_sim.group_loads().len(), group_loads);
    }

    #[test]
    fn fifo_after_fixed_waveform_starts_empty() {
        let sim = SimTcu::new();
        let mut mux = NoMux;
        let mut pwm = pwm(&sim, Channel::Ch3, PwmConfig::default());
        let ch = Channel::Ch3;

        pwm.configure_fifo_mode1(&mut mux, &[1, 2, 3], &[10, 20, 30])
            .unwrap();
        assert_eq!(pwm.fifo_level(), Some(3));
        pwm.configure(5, 50).unwrap();
        assert_eq!(pwm.fifo_level(), Some(0));
        assert_eq!(sim.fifo_control(ch).mode(), FifoMode::NonFifo);
        assert!(pwm.is_fifo_armed());

        pwm.configure_fifo_mode1(&mut mux, &[7], &[70]).unwrap();
        assert_eq!(sim.fifo_entries(ch), [(70 << 16) | 7]);
        assert_eq!(pwm.fifo_level(), Some(1));
        assert_eq!(sim.fifo_control(ch).depth().value(), 1);
    }

    #[test]
    fn fifo_level_without_fifo() {
        let sim = SimTcu::new();
        let mut pwm = pwm(&sim, Channel::Ch2, PwmConfig::default());
        assert_eq!(pwm.fifo_level(), None);
    }

    #[test]
    fn fifo_zero_value_writes_nothing() {
        let tcu_sim = SimTcu::new();
        let gpio_sim = SimGpio::new();
        let gpioz = Gpioz::new(gpio_sim.gpioz()).unwrap();
        let mut port_e = GpioPort::new(gpio_sim.port(PortId::E), &gpioz).unwrap();
        let mut pwm = pwm(&tcu_sim, Channel::Ch5, PwmConfig::default());

        assert_eq!(
            pwm.configure_fifo_mode1(&mut port_e, &[5, 5, 0], &[9, 9, 9]),
            Err(PwmError::ZeroValue { index: 2 })
        );
        assert_eq!(
            pwm.configure_fifo_mode2(&mut port_e, &[5], &[0], 1),
            Err(PwmError::ZeroValue { index: 0 })
        );
        assert!(tcu_sim.writes().is_empty());
        assert!(gpio_sim.group_loads().is_empty());
        assert!(!pwm.is_fifo_armed());
    }

    #[test]
    fn fifo_validation() {
        let sim = SimTcu::new();
        let mut mux = NoMux;
        let mut pwm0 = pwm(&sim, Channel::Ch0, PwmConfig::default());
        assert_eq!(
            pwm0.configure_fifo_mode1(&mut mux, &[1, 2], &[3]),
            Err(PwmError::LengthMismatch)
        );
        assert_eq!(
            pwm0.configure_fifo_mode1(&mut mux, &[], &[]),
            Err(PwmError::InvalidFifoLength(0))
        );
        let long: Vec<u16> = (1..=17).collect();
        assert_eq!(
            pwm0.configure_fifo_mode1(&mut mux, &long, &long),
            Err(PwmError::InvalidFifoLength(17))
        );
        assert_eq!(
            pwm0.configure_fifo_mode2(&mut mux, &[1], &[2], 0),
            Err(PwmError::ZeroCycles)
        );
        let mut pwm7 = pwm(&sim, Channel::Ch7, PwmConfig::default());
        assert_eq!(
            pwm7.configure_fifo_mode1(&mut mux, &[1], &[2]),
            Err(PwmError::NoFifo(Channel::Ch7))
        );
        assert!(sim.writes().is_empty());

        let full: Vec<u16> = (1..=16).collect();
        pwm0.configure_fifo_mode1(&mut mux, &full, &full).unwrap();
        assert_eq!(sim.fifo_entries(Channel::Ch0).len(), FIFO_DEPTH);
        assert_eq!(sim.fifo_control(Channel::Ch0).depth().value(), 16);
    }

    #[test]
    fn pin_mux_error_is_forwarded() {
        let tcu_sim = SimTcu::new();
        let gpio_sim = SimGpio::new();
        let gpioz = Gpioz::new(gpio_sim.gpioz()).unwrap();
        let mut port_a = GpioPort::new(gpio_sim.port(PortId::A), &gpioz).unwrap();
        let mut pwm = pwm(&tcu_sim, Channel::Ch3, PwmConfig::default());
        assert_eq!(
            pwm.configure_fifo_mode1(&mut port_a, &[1], &[2]),
            Err(PwmError::PinMux(GpioError::WrongPort {
                expected: PortId::E,
                actual: PortId::A
            }))
        );
        assert!(!pwm.is_fifo_armed());
        assert!(tcu_sim.writes().is_empty());
    }
}
