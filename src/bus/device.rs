//! `embedded-hal` `SpiDevice` view of a single chip-select line.

use embedded_hal::digital::OutputPin;
use embedded_hal::spi::{ErrorType, Operation, SpiDevice};

use super::{BusError, ShiftRegister, Transport};

/// A [`Transport`] borrowed for one chip-select line.
///
/// Every [`SpiDevice::transaction`] asserts the line, runs all operations and
/// releases the line, so drivers written against `SpiDevice` inherit the bus
/// framing.
pub struct BusDevice<'a, SR, CS, const N: usize> {
    bus: &'a mut Transport<SR, CS, N>,
    line: usize,
}

impl<'a, SR, CS, const N: usize> BusDevice<'a, SR, CS, N> {
    pub(super) fn new(bus: &'a mut Transport<SR, CS, N>, line: usize) -> Self {
        Self { bus, line }
    }

    /// Chip-select line this device is bound to.
    pub fn line(&self) -> usize {
        self.line
    }
}

impl<SR, CS, const N: usize> ErrorType for BusDevice<'_, SR, CS, N>
where
    SR: ShiftRegister,
    CS: OutputPin,
{
    type Error = BusError<CS::Error>;
}

impl<SR, CS, const N: usize> SpiDevice for BusDevice<'_, SR, CS, N>
where
    SR: ShiftRegister,
    CS: OutputPin,
{
    fn transaction(&mut self, operations: &mut [Operation<'_, u8>]) -> Result<(), Self::Error> {
        self.bus.transaction(self.line, |bus| {
            for operation in operations.iter_mut() {
                match operation {
                    Operation::Read(buf) => bus.read_zero_filled(buf)?,
                    Operation::Write(data) => bus.write_discarding(data)?,
                    Operation::Transfer(read, write) => bus.transfer_padded(read, write)?,
                    Operation::TransferInPlace(buf) => bus.exchange_in_place(buf)?,
                    Operation::DelayNs(_) => return Err(BusError::DelayUnsupported),
                }
            }
            Ok(())
        })
    }
}

impl<SR, CS, const N: usize> Transport<SR, CS, N>
where
    SR: ShiftRegister,
    CS: OutputPin,
{
    // Outbound content during a read is padding.
    fn read_zero_filled(&mut self, buf: &mut [u8]) -> Result<(), BusError<CS::Error>> {
        buf.fill(0x00);
        self.exchange_in_place(buf)
    }

    fn write_discarding(&mut self, data: &[u8]) -> Result<(), BusError<CS::Error>> {
        let mut scratch = [0u8; 1];
        for byte in data {
            self.exchange(core::slice::from_ref(byte), &mut scratch)?;
        }
        Ok(())
    }

    // Clocks max(read, write) bytes: missing outbound bytes are zeros, surplus inbound bytes are dropped.
    fn transfer_padded(&mut self, read: &mut [u8], write: &[u8]) -> Result<(), BusError<CS::Error>> {
        let total = read.len().max(write.len());
        let mut inbound = [0u8; 1];
        for index in 0..total {
            let out = write.get(index).copied().unwrap_or(0x00);
            self.exchange(&[out], &mut inbound)?;
            if let Some(slot) = read.get_mut(index) {
                *slot = inbound[0];
            }
        }
        Ok(())
    }
}
