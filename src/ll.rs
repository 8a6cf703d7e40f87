//! Register level access: standard commands, control subcommands and the raw
//! manufacturer access control (MAC) window.

use device_driver::{AsyncCommandInterface, AsyncRegisterInterface};
use embedded_hal_async::i2c::{I2c as AsyncI2c, Operation};

device_driver::create_device!(
    device_name: Bq35100,
    dsl: {
        config {
            type RegisterAddressType = u8;
            type CommandAddressType = u16;
            type DefaultByteOrder = LE;
        }

        /// Subcommand or key word. Reads back the last subcommand until CONTROL_STATUS
        /// is read again.
        register Control {
            const ADDRESS = 0x00;
            const SIZE_BITS = 16;
            const ALLOW_ADDRESS_OVERLAP = true;

            word: uint = 0..16,
        },

        register ControlStatus {
            const ADDRESS = 0x00;
            const SIZE_BITS = 16;
            const ALLOW_ADDRESS_OVERLAP = true;

            status: uint = 0..16,
        },

        /// µAh, negative while discharging.
        register AccumulatedCapacity {
            const ADDRESS = 0x02;
            const SIZE_BITS = 32;

            capacity: int = 0..32,
        },

        /// 0.1 K
        register Temperature {
            const ADDRESS = 0x06;
            const SIZE_BITS = 16;

            temperature: uint = 0..16,
        },

        /// mV
        register Voltage {
            const ADDRESS = 0x08;
            const SIZE_BITS = 16;

            voltage: uint = 0..16,
        },

        /// mA, negative while discharging.
        register Current {
            const ADDRESS = 0x0C;
            const SIZE_BITS = 16;

            current: int = 0..16,
        },

        /// mAh
        register DesignCapacity {
            const ADDRESS = 0x3C;
            const SIZE_BITS = 16;

            capacity: uint = 0..16,
        },

        /// Response of the last subcommand that returns data.
        register MacData {
            const ADDRESS = 0x40;
            const SIZE_BITS = 16;

            data: uint = 0..16,
        },

        command DeviceType {
            const ADDRESS = 0x0001;
        },
        command FwVersion {
            const ADDRESS = 0x0002;
        },
        command HwVersion {
            const ADDRESS = 0x0003;
        },
        command GaugeStart {
            const ADDRESS = 0x0011;
        },
        command GaugeStop {
            const ADDRESS = 0x0012;
        },
        command Sealed {
            const ADDRESS = 0x0020;
        },
        command Reset {
            const ADDRESS = 0x0041;
        },
        /// Clears the accumulated capacity.
        command NewBattery {
            const ADDRESS = 0xA613;
        },
    }
);

/// Registers driven by hand: the subcommand target and the MAC block window.
pub mod reg {
    pub const CONTROL: u8 = 0x00;
    pub const MAC: u8 = 0x3E;
    /// Followed by MAC_DATA_LEN at 0x61.
    pub const MAC_DATA_SUM: u8 = 0x60;
}

/// Data flash locations reachable through the MAC block protocol.
pub mod flash {
    use core::ops::RangeInclusive;

    pub const WINDOW: RangeInclusive<u16> = 0x4000..=0x43FF;

    /// Design capacity, big endian mAh.
    pub const DESIGN_CAPACITY: u16 = 0x41FE;
    /// Full access key, big endian.
    pub const FULL_ACCESS_CODES: u16 = 0x41D0;
}

pub const DEVICE_TYPE: u16 = 0x0100;

/// Largest payload of a single MAC block transfer.
pub const MAC_DATA_LEN: usize = 32;
/// Address (2), checksum (1) and length (1) bytes around the payload.
pub const MAC_OVERHEAD_LEN: usize = 4;
pub const MAC_COMPLETE_LEN: usize = MAC_DATA_LEN + MAC_OVERHEAD_LEN;

pub struct Bq35100I2cInterface<I> {
    pub i2c: I,
    pub address: u8,
}

impl<I> Bq35100I2cInterface<I>
where
    I: AsyncI2c,
{
    /// Writes `data` starting at `register` in a single transfer.
    pub async fn write_raw(&mut self, register: u8, data: &[u8]) -> Result<(), I::Error> {
        logger::trace!("write {:#x}: {}", register, logger::Hex(data));

        let result = self
            .i2c
            .transaction(
                self.address,
                &mut [Operation::Write(&[register]), Operation::Write(data)],
            )
            .await;

        if result.is_err() {
            logger::error!("Failed to write register {:#x}", register);
        }

        result
    }

    /// Reads `data.len()` bytes starting at `register`.
    pub async fn read_raw(&mut self, register: u8, data: &mut [u8]) -> Result<(), I::Error> {
        let result = self
            .i2c
            .transaction(
                self.address,
                &mut [Operation::Write(&[register]), Operation::Read(data)],
            )
            .await;

        if result.is_ok() {
            logger::trace!("read {:#x}: {}", register, logger::Hex(data));
        } else {
            logger::error!("Failed to read register {:#x}", register);
        }

        result
    }
}

impl<I> AsyncCommandInterface for Bq35100I2cInterface<I>
where
    I: AsyncI2c,
{
    type AddressType = u16;
    type Error = I::Error;

    async fn dispatch_command(
        &mut self,
        address: Self::AddressType,
        _size_bits_in: u32,
        _input: &[u8],
        _size_bits_out: u32,
        _output: &mut [u8],
    ) -> Result<(), Self::Error> {
        self.write_raw(reg::CONTROL, &address.to_le_bytes()).await
    }
}

impl<I> AsyncRegisterInterface for Bq35100I2cInterface<I>
where
    I: AsyncI2c,
{
    type AddressType = u8;
    type Error = I::Error;

    async fn write_register(
        &mut self,
        address: Self::AddressType,
        _size_bits: u32,
        data: &[u8],
    ) -> Result<(), Self::Error> {
        self.write_raw(address, data).await
    }

    async fn read_register(
        &mut self,
        address: Self::AddressType,
        _size_bits: u32,
        data: &mut [u8],
    ) -> Result<(), Self::Error> {
        self.read_raw(address, data).await
    }
}
