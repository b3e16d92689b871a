//! Synchronous SPI transport with owned chip-select lines.
//!
//! [`Transport`] drives a byte-wide shift register (the SPI peripheral) and up
//! to `N` active-low chip-select pins. Every byte is started, busy-waited on
//! through [`ShiftRegister::transfer_complete`] and then sampled, so a stalled
//! peripheral surfaces as [`BusError::TransportTimeout`] instead of a hang.

#![allow(unused_parens)]

pub mod device;

use embedded_hal::digital::OutputPin;
use embedded_hal::spi::{ErrorKind, Phase, Polarity};
use modular_bitfield::prelude::*;

use crate::config::{BitOrder, BusConfig, ConfigError};

pub use self::device::BusDevice;

/// Bitfield representation of the SPI control register (`SPCR`).
#[allow(unused_parens)]
#[bitfield]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpiControl {
    // Clock rate select (bits 1:0).
    pub rate: B2,
    // Sample on the trailing edge (bit 2).
    pub clock_phase: bool,
    // Clock idles high (bit 3).
    pub clock_polarity: bool,
    // Master mode (bit 4).
    pub master: bool,
    // LSB shifted first (bit 5).
    pub lsb_first: bool,
    // Peripheral enable (bit 6).
    pub enable: bool,
    // Transfer-complete interrupt enable (bit 7).
    pub interrupt_enable: bool,
}

impl SpiControl {
    /// Builds the control word for an enabled master with interrupts off.
    pub fn from_config(config: &BusConfig) -> Self {
        Self::new()
            .with_rate(config.clock_divisor.rate_bits())
            .with_clock_phase(config.mode.phase == Phase::CaptureOnSecondTransition)
            .with_clock_polarity(config.mode.polarity == Polarity::IdleHigh)
            .with_master(true)
            .with_lsb_first(config.bit_order == BitOrder::LsbFirst)
            .with_enable(true)
            .with_interrupt_enable(false)
    }
}

impl From<u8> for SpiControl {
    fn from(value: u8) -> Self {
        Self::from_bytes([value])
    }
}

impl From<SpiControl> for u8 {
    fn from(value: SpiControl) -> Self {
        value.into_bytes()[0]
    }
}

/// Byte-level access to the SPI peripheral.
///
/// Writing a byte with [`load`](Self::load) starts the shift; the inbound
/// byte is valid once [`transfer_complete`](Self::transfer_complete) reports
/// `true`.
pub trait ShiftRegister {
    /// Applies the control word and the double-speed flag.
    fn configure(&mut self, control: SpiControl, double_speed: bool);

    /// Loads the data register, starting a transfer.
    fn load(&mut self, byte: u8);

    /// Polls the shift-complete flag.
    fn transfer_complete(&mut self) -> bool;

    /// Reads the byte sampled during the last transfer.
    fn take(&mut self) -> u8;
}

/// Failures raised by the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BusError<PinE> {
    /// The shift-complete flag never rose within the poll bound.
    TransportTimeout,
    /// Another chip-select line is already asserted.
    LineBusy {
        /// Line currently asserted.
        active: usize,
    },
    /// The operation needs the addressed line to be asserted first.
    NotSelected,
    /// Line index outside the configured chip-select set.
    InvalidLine,
    /// Outbound and inbound buffers differ in length.
    LengthMismatch,
    /// Delays inside a transaction are not supported by the transport.
    DelayUnsupported,
    /// The bus configuration was rejected.
    InvalidConfig(ConfigError),
    /// A chip-select pin reported an error.
    Pin(PinE),
}

impl<PinE> embedded_hal::spi::Error for BusError<PinE>
where
    PinE: core::fmt::Debug,
{
    fn kind(&self) -> ErrorKind {
        match self {
            Self::LineBusy { .. } | Self::NotSelected | Self::InvalidLine | Self::Pin(_) => {
                ErrorKind::ChipSelectFault
            }
            _ => ErrorKind::Other,
        }
    }
}

/// Exclusive owner of the SPI peripheral and its chip-select lines.
pub struct Transport<SR, CS, const N: usize> {
    shifter: SR,
    lines: [CS; N],
    active: Option<usize>,
    timeout_polls: u32,
}

impl<SR, CS, const N: usize> Transport<SR, CS, N>
where
    SR: ShiftRegister,
    CS: OutputPin,
{
    /// Configures the peripheral as bus master and releases every chip-select line.
    ///
    /// This is the only way to obtain a transport, so the bus is configured
    /// exactly once before any transfer.
    pub fn configure(
        mut shifter: SR,
        mut lines: [CS; N],
        config: BusConfig,
    ) -> Result<Self, BusError<CS::Error>> {
        config.validate().map_err(BusError::InvalidConfig)?;

        for line in lines.iter_mut() {
            line.set_high().map_err(BusError::Pin)?;
        }

        let control = SpiControl::from_config(&config);
        shifter.configure(control, config.clock_divisor.double_speed());
        debug!(
            "spi configured: control={=u8:#x} divisor={=u16}",
            u8::from(control),
            config.clock_divisor.divisor()
        );

        Ok(Self {
            shifter,
            lines,
            active: None,
            timeout_polls: config.timeout_polls,
        })
    }

    /// Consumes the transport and returns the peripheral and pins.
    pub fn release(self) -> (SR, [CS; N]) {
        (self.shifter, self.lines)
    }

    /// Returns the currently asserted line, if any.
    pub fn active_line(&self) -> Option<usize> {
        self.active
    }

    /// Drives `line` low. Fails if any line is already asserted.
    pub fn select(&mut self, line: usize) -> Result<(), BusError<CS::Error>> {
        if let Some(active) = self.active {
            warn!("select({=usize}) while line {=usize} is active", line, active);
            return Err(BusError::LineBusy { active });
        }

        let pin = self.lines.get_mut(line).ok_or(BusError::InvalidLine)?;
        pin.set_low().map_err(BusError::Pin)?;
        self.active = Some(line);
        trace!("cs{=usize} low", line);
        Ok(())
    }

    /// Drives `line` high. Fails unless `line` is the asserted line.
    ///
    /// A pin error is returned, but the transport no longer treats `line` as
    /// asserted, so the next transaction can proceed.
    pub fn deselect(&mut self, line: usize) -> Result<(), BusError<CS::Error>> {
        if self.active != Some(line) {
            return Err(BusError::NotSelected);
        }

        let pin = self.lines.get_mut(line).ok_or(BusError::InvalidLine)?;
        // The line is released from the bookkeeping even if the pin write fails.
        self.active = None;
        pin.set_high().map_err(BusError::Pin)?;
        trace!("cs{=usize} high", line);
        Ok(())
    }

    /// Shifts out `out` while sampling one inbound byte per outbound byte into `inbound`.
    pub fn exchange(&mut self, out: &[u8], inbound: &mut [u8]) -> Result<(), BusError<CS::Error>> {
        if out.len() != inbound.len() {
            return Err(BusError::LengthMismatch);
        }
        self.ensure_selected()?;

        for (tx, rx) in out.iter().zip(inbound.iter_mut()) {
            *rx = self.exchange_byte(*tx)?;
        }
        Ok(())
    }

    /// Like [`exchange`](Self::exchange) but replaces each outbound byte with the inbound one.
    pub fn exchange_in_place(&mut self, buf: &mut [u8]) -> Result<(), BusError<CS::Error>> {
        self.ensure_selected()?;

        for byte in buf.iter_mut() {
            *byte = self.exchange_byte(*byte)?;
        }
        Ok(())
    }

    /// Runs `f` between `select(line)` and `deselect(line)`.
    ///
    /// The line is released even when `f` fails; the first error wins.
    pub fn transaction<R, F>(&mut self, line: usize, f: F) -> Result<R, BusError<CS::Error>>
    where
        F: FnOnce(&mut Self) -> Result<R, BusError<CS::Error>>,
    {
        self.select(line)?;
        let result = f(self);
        let released = self.deselect(line);
        let value = result?;
        released?;
        Ok(value)
    }

    /// Borrows the transport as an [`embedded_hal::spi::SpiDevice`] bound to `line`.
    pub fn device(&mut self, line: usize) -> Result<BusDevice<'_, SR, CS, N>, BusError<CS::Error>> {
        if line >= N {
            return Err(BusError::InvalidLine);
        }
        Ok(BusDevice::new(self, line))
    }

    fn ensure_selected(&self) -> Result<(), BusError<CS::Error>> {
        match self.active {
            Some(_) => Ok(()),
            None => Err(BusError::NotSelected),
        }
    }

    fn exchange_byte(&mut self, out: u8) -> Result<u8, BusError<CS::Error>> {
        self.shifter.load(out);
        for _ in 0..self.timeout_polls {
            if self.shifter.transfer_complete() {
                return Ok(self.shifter.take());
            }
            core::hint::spin_loop();
        }

        warn!("spi transfer timed out after {=u32} polls", self.timeout_polls);
        Err(BusError::TransportTimeout)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::config::ClockDivisor;
    use core::cell::{Cell, RefCell};
    use core::convert::Infallible;
    use embedded_hal::digital::{ErrorKind as PinErrorKind, ErrorType};
    use std::collections::VecDeque;
    use std::rc::Rc;
    use std::vec::Vec;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub(crate) enum Event {
        Low(usize),
        High(usize),
        Configure(u8, bool),
        Shift(u8),
    }

    pub(crate) type Log = Rc<RefCell<Vec<Event>>>;

    pub(crate) struct FakePin {
        id: usize,
        log: Log,
    }

    impl ErrorType for FakePin {
        type Error = Infallible;
    }

    impl OutputPin for FakePin {
        fn set_low(&mut self) -> Result<(), Self::Error> {
            self.log.borrow_mut().push(Event::Low(self.id));
            Ok(())
        }

        fn set_high(&mut self) -> Result<(), Self::Error> {
            self.log.borrow_mut().push(Event::High(self.id));
            Ok(())
        }
    }

    pub(crate) struct FakeShifter {
        log: Log,
        responses: VecDeque<u8>,
        busy_polls: u32,
        polls: u32,
    }

    impl ShiftRegister for FakeShifter {
        fn configure(&mut self, control: SpiControl, double_speed: bool) {
            self.log
                .borrow_mut()
                .push(Event::Configure(u8::from(control), double_speed));
        }

        fn load(&mut self, byte: u8) {
            self.log.borrow_mut().push(Event::Shift(byte));
            self.polls = 0;
        }

        fn transfer_complete(&mut self) -> bool {
            self.polls = self.polls.saturating_add(1);
            self.polls > self.busy_polls
        }

        fn take(&mut self) -> u8 {
            self.responses.pop_front().unwrap_or(0xFF)
        }
    }

    /// Builds a two-line transport whose peripheral answers with `responses`
    /// after `busy_polls` unsuccessful completion checks per byte.
    pub(crate) fn fake_transport(
        responses: &[u8],
        busy_polls: u32,
        config: BusConfig,
    ) -> (Transport<FakeShifter, FakePin, 2>, Log) {
        let log: Log = Rc::new(RefCell::new(Vec::new()));
        let shifter = FakeShifter {
            log: log.clone(),
            responses: responses.iter().copied().collect(),
            busy_polls,
            polls: 0,
        };
        let lines = [
            FakePin { id: 0, log: log.clone() },
            FakePin { id: 1, log: log.clone() },
        ];
        let transport = Transport::configure(shifter, lines, config).unwrap();
        log.borrow_mut().clear();
        (transport, log)
    }

    #[test]
    fn control_word_matches_register_layout() {
        let lsm = SpiControl::from_config(&BusConfig::lsm330());
        assert_eq!(u8::from(lsm), 0b0101_1100);

        let max = SpiControl::from_config(&BusConfig::max31855());
        assert_eq!(u8::from(max), 0b0101_0000);

        let slow_lsb = BusConfig::new()
            .clock_divisor(ClockDivisor::Div128)
            .bit_order(BitOrder::LsbFirst)
            .build();
        assert_eq!(u8::from(SpiControl::from_config(&slow_lsb)), 0b0111_0011);
    }

    #[test]
    fn configure_releases_lines_before_enabling_peripheral() {
        let log: Log = Rc::new(RefCell::new(Vec::new()));
        let shifter = FakeShifter {
            log: log.clone(),
            responses: VecDeque::new(),
            busy_polls: 0,
            polls: 0,
        };
        let lines = [
            FakePin { id: 0, log: log.clone() },
            FakePin { id: 1, log: log.clone() },
        ];
        let config = BusConfig::new().clock_divisor(ClockDivisor::Div8).build();
        let transport = Transport::configure(shifter, lines, config).unwrap();

        assert_eq!(transport.active_line(), None);
        assert_eq!(
            *log.borrow(),
            [Event::High(0), Event::High(1), Event::Configure(0b0101_0001, true)]
        );
    }

    #[test]
    fn configure_rejects_invalid_config() {
        let log: Log = Rc::new(RefCell::new(Vec::new()));
        let shifter = FakeShifter {
            log: log.clone(),
            responses: VecDeque::new(),
            busy_polls: 0,
            polls: 0,
        };
        let lines = [FakePin { id: 0, log: log.clone() }];
        let config = BusConfig::new().timeout_polls(0).build();

        let result = Transport::configure(shifter, lines, config);
        assert!(matches!(
            result,
            Err(BusError::InvalidConfig(ConfigError::ZeroTimeout))
        ));
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn transaction_brackets_every_exchange_with_chip_select() {
        let (mut bus, log) = fake_transport(&[0x11, 0x22, 0x33, 0x44], 2, BusConfig::default());

        let (first, second) = bus
            .transaction(0, |bus| {
                let mut first = [0u8; 1];
                bus.exchange(&[0xA0], &mut first)?;
                let mut second = [0u8; 3];
                bus.exchange(&[0x00; 3], &mut second)?;
                Ok((first, second))
            })
            .unwrap();

        assert_eq!(first.len() + second.len(), 4);
        assert_eq!(first, [0x11]);
        assert_eq!(second, [0x22, 0x33, 0x44]);
        assert_eq!(
            *log.borrow(),
            [
                Event::Low(0),
                Event::Shift(0xA0),
                Event::Shift(0x00),
                Event::Shift(0x00),
                Event::Shift(0x00),
                Event::High(0),
            ]
        );
        assert_eq!(bus.active_line(), None);
    }

    #[test]
    fn second_select_is_rejected_while_line_active() {
        let (mut bus, log) = fake_transport(&[], 0, BusConfig::default());

        bus.select(0).unwrap();
        assert_eq!(bus.select(1), Err(BusError::LineBusy { active: 0 }));
        assert_eq!(bus.active_line(), Some(0));
        bus.deselect(0).unwrap();

        assert_eq!(*log.borrow(), [Event::Low(0), Event::High(0)]);
    }

    #[test]
    fn exchange_requires_selected_line() {
        let (mut bus, log) = fake_transport(&[0x55], 0, BusConfig::default());

        let mut inbound = [0u8; 1];
        assert_eq!(bus.exchange(&[0x00], &mut inbound), Err(BusError::NotSelected));
        assert_eq!(bus.deselect(1), Err(BusError::NotSelected));
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn exchange_rejects_mismatched_buffers() {
        let (mut bus, _log) = fake_transport(&[], 0, BusConfig::default());

        bus.select(1).unwrap();
        let mut inbound = [0u8; 2];
        assert_eq!(bus.exchange(&[0x00], &mut inbound), Err(BusError::LengthMismatch));
    }

    #[test]
    fn unknown_line_is_rejected() {
        let (mut bus, _log) = fake_transport(&[], 0, BusConfig::default());

        assert_eq!(bus.select(2), Err(BusError::InvalidLine));
        assert!(matches!(bus.device(5), Err(BusError::InvalidLine)));
        assert_eq!(bus.active_line(), None);
    }

    #[test]
    fn delayed_completion_within_bound_succeeds() {
        let config = BusConfig::new().timeout_polls(4).build();
        let (mut bus, _log) = fake_transport(&[0x5A, 0xA5], 3, config);

        let mut buf = [0x00, 0x00];
        bus.transaction(1, |bus| bus.exchange_in_place(&mut buf))
            .unwrap();
        assert_eq!(buf, [0x5A, 0xA5]);
    }

    #[test]
    fn stalled_transfer_times_out_and_releases_line() {
        let config = BusConfig::new().timeout_polls(8).build();
        let (mut bus, log) = fake_transport(&[0x01], u32::MAX, config);

        let mut buf = [0x00];
        let result = bus.transaction(0, |bus| bus.exchange_in_place(&mut buf));

        assert_eq!(result, Err(BusError::TransportTimeout));
        assert_eq!(bus.active_line(), None);
        assert_eq!(
            *log.borrow(),
            [Event::Low(0), Event::Shift(0x00), Event::High(0)]
        );
    }

    struct FlakyPin {
        fail_high: Rc<Cell<bool>>,
    }

    impl ErrorType for FlakyPin {
        type Error = PinErrorKind;
    }

    impl OutputPin for FlakyPin {
        fn set_low(&mut self) -> Result<(), Self::Error> {
            Ok(())
        }

        fn set_high(&mut self) -> Result<(), Self::Error> {
            if self.fail_high.get() {
                return Err(PinErrorKind::Other);
            }
            Ok(())
        }
    }

    #[test]
    fn failed_release_does_not_block_later_transactions() {
        let log: Log = Rc::new(RefCell::new(Vec::new()));
        let fail_high = Rc::new(Cell::new(false));
        let shifter = FakeShifter {
            log: log.clone(),
            responses: VecDeque::new(),
            busy_polls: 0,
            polls: 0,
        };
        let lines = [
            FlakyPin { fail_high: fail_high.clone() },
            FlakyPin { fail_high: fail_high.clone() },
        ];
        let mut bus = Transport::configure(shifter, lines, BusConfig::default()).unwrap();

        fail_high.set(true);
        let first = bus.transaction(0, |_| Ok(()));
        assert_eq!(first, Err(BusError::Pin(PinErrorKind::Other)));
        assert_eq!(bus.active_line(), None);

        fail_high.set(false);
        assert_eq!(bus.transaction(1, |_| Ok(())), Ok(()));
        assert_eq!(bus.active_line(), None);
    }
}
