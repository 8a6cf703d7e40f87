#![cfg_attr(not(test), no_std)]

//! Driver for the TI BQ35100 primary-cell gas gauge.
//!
//! A [`Bq35100`] is one session with one chip. It tracks the chip's security mode,
//! so every operation that needs elevated access can unseal the chip and put it back
//! the way it found it.

use embedded_hal_async::{delay::DelayNs as AsyncDelayNs, i2c::I2c as AsyncI2c};

mod checksum;
mod error;
pub mod ll;
mod memory;
mod poll;
mod property;
mod security;
mod status;


pub use checksum::checksum;
pub use error::{Corruption, Error, ErrorKind, IoFailure};
pub use property::{remaining_capacity_uah, state_of_charge, Property, PropertyValue};
pub use status::{ControlStatus, SecurityMode};

#[derive(Clone, Copy, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Config {
    /// 7-bit I2C address.
    pub address: u8,

    /// Number of attempts for status polling and for each security mode change.
    pub max_retries: u8,

    /// Settle time after data flash writes and security key writes.
    pub flash_write_delay_ms: u32,

    /// Settle time after the design capacity write of a new battery sequence.
    pub new_battery_delay_ms: u32,

    /// Poll interval while waiting for the gauge to start or stop.
    pub gauge_poll_interval_ms: u32,

    /// Poll interval while waiting for INITCOMP during [`Bq35100::init_session`].
    pub init_poll_interval_ms: u32,

    /// Unseal key, sent as two 16-bit words, most significant word first.
    pub unseal_key: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            address: 0x55,
            max_retries: 3,
            flash_write_delay_ms: 100,
            new_battery_delay_ms: 500,
            gauge_poll_interval_ms: 500,
            init_poll_interval_ms: 300,
            unseal_key: 0x0414_3672,
        }
    }
}

pub struct Bq35100<I> {
    driver: ll::Bq35100<ll::Bq35100I2cInterface<I>>,
    config: Config,
    security: SecurityMode,
}

impl<I> Bq35100<I> {
    pub const fn new(i2c: I, config: Config) -> Self {
        Self {
            driver: ll::Bq35100::new(ll::Bq35100I2cInterface {
                i2c,
                address: config.address,
            }),
            config,
            security: SecurityMode::Unknown,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The security mode the chip was last observed in.
    pub fn security_mode(&self) -> SecurityMode {
        self.security
    }

    pub fn inner_mut(&mut self) -> &mut I {
        &mut self.driver.interface().i2c
    }

    pub fn into_inner(self) -> I {
        self.driver.interface.i2c
    }
}

impl<I> Bq35100<I>
where
    I: AsyncI2c,
{
    /// Brings up the session: checks the device type, learns the current security
    /// mode and waits for the chip to finish its own initialization.
    pub async fn init_session(
        &mut self,
        delay: &mut impl AsyncDelayNs,
    ) -> Result<(), Error<I::Error>> {
        let Ok(status) = self.read_status().await else {
            logger::error!("Reading device status failed");
            return Err(Error::DeviceNotReady);
        };

        let Ok(device_type) = self.read_device_type().await else {
            logger::error!("Reading device type failed");
            return Err(Error::DeviceNotReady);
        };

        if device_type != ll::DEVICE_TYPE {
            logger::error!(
                "Device type mismatch! Expected: {:#x}, received: {:#x}",
                ll::DEVICE_TYPE,
                device_type
            );
            return Err(Error::DeviceNotReady);
        }

        let security = status.security();
        if !security.is_known() {
            logger::error!("Invalid security mode in status {:#x}", status.bits());
            return Err(Error::DeviceNotReady);
        }
        logger::debug!("Device is in {:?} mode", security);
        self.security = security;

        if !status.init_complete() {
            logger::warn!("Device initialization not complete");

            let interval = self.config.init_poll_interval_ms;
            if self
                .wait_for_status(ControlStatus::INITCOMP, ControlStatus::INITCOMP, interval, delay)
                .await
                .is_err()
            {
                logger::error!("Device initialization failed");
                return Err(Error::DeviceNotReady);
            }
        }

        logger::info!("BQ35100 with device type {:#x} initialized", device_type);

        Ok(())
    }

    pub async fn read_status(&mut self) -> Result<ControlStatus, Error<I::Error>> {
        logger::trace!("Reading device status");
        let reg = self
            .driver
            .control_status()
            .read_async()
            .await
            .map_err(Error::Transport)?;

        Ok(ControlStatus::from_bits_retain(reg.status()))
    }

    pub async fn read_device_type(&mut self) -> Result<u16, Error<I::Error>> {
        self.driver
            .device_type()
            .dispatch_async()
            .await
            .map_err(Error::Transport)?;
        self.read_control_response().await
    }

    pub async fn read_firmware_version(&mut self) -> Result<u16, Error<I::Error>> {
        self.driver
            .fw_version()
            .dispatch_async()
            .await
            .map_err(Error::Transport)?;
        self.read_control_response().await
    }

    pub async fn read_hardware_version(&mut self) -> Result<u16, Error<I::Error>> {
        self.driver
            .hw_version()
            .dispatch_async()
            .await
            .map_err(Error::Transport)?;
        self.read_control_response().await
    }

    /// Reads the 16-bit result of the subcommand that was just issued.
    async fn read_control_response(&mut self) -> Result<u16, Error<I::Error>> {
        // CONTROL echoes the subcommand first, the result follows in MAC_DATA.
        let echo = self
            .driver
            .control()
            .read_async()
            .await
            .map_err(Error::Transport)?;
        logger::trace!("Subcommand echo {:#x}", echo.word());

        let reg = self
            .driver
            .mac_data()
            .read_async()
            .await
            .map_err(Error::Transport)?;

        Ok(reg.data())
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        test::{cntl, init_test, RecordingDelay, SimulatedChip},
        Bq35100, Config, Error, SecurityMode,
    };

    #[async_std::test]
    async fn init_learns_security_mode() {
        init_test();

        let mut chip = SimulatedChip::new();
        chip.security = SecurityMode::Unsealed;
        let mut delay = RecordingDelay::default();

        let mut gauge = Bq35100::new(&mut chip, Config::default());
        assert_eq!(gauge.security_mode(), SecurityMode::Unknown);

        gauge.init_session(&mut delay).await.unwrap();

        assert_eq!(gauge.security_mode(), SecurityMode::Unsealed);
        assert!(delay.delays_ms.is_empty());
    }

    #[async_std::test]
    async fn init_rejects_wrong_device_type() {
        init_test();

        let mut chip = SimulatedChip::new();
        chip.device_type = 0x0425;
        let mut delay = RecordingDelay::default();

        let mut gauge = Bq35100::new(&mut chip, Config::default());
        let result = gauge.init_session(&mut delay).await;

        assert!(matches!(result, Err(Error::DeviceNotReady)));
        assert_eq!(gauge.security_mode(), SecurityMode::Unknown);
    }

    #[async_std::test]
    async fn init_rejects_invalid_security_field() {
        init_test();

        let mut chip = SimulatedChip::new();
        chip.security = SecurityMode::Unknown;
        let mut delay = RecordingDelay::default();

        let mut gauge = Bq35100::new(&mut chip, Config::default());
        let result = gauge.init_session(&mut delay).await;

        assert!(matches!(result, Err(Error::DeviceNotReady)));
    }

    #[async_std::test]
    async fn init_reports_bus_failure_as_not_ready() {
        init_test();

        let mut chip = SimulatedChip::new();
        chip.fail_transfers = true;
        let mut delay = RecordingDelay::default();

        let mut gauge = Bq35100::new(&mut chip, Config::default());
        let result = gauge.init_session(&mut delay).await;

        assert!(matches!(result, Err(Error::DeviceNotReady)));
    }

    #[async_std::test]
    async fn init_waits_for_initcomp() {
        init_test();

        let mut chip = SimulatedChip::new();
        chip.init_complete_after_reads = Some(2);
        let mut delay = RecordingDelay::default();

        let mut gauge = Bq35100::new(&mut chip, Config::default());
        gauge.init_session(&mut delay).await.unwrap();

        assert_eq!(delay.delays_ms, [300]);
    }

    #[async_std::test]
    async fn init_fails_when_initcomp_never_sets() {
        init_test();

        let mut chip = SimulatedChip::new();
        chip.init_complete_after_reads = Some(u32::MAX);
        let mut delay = RecordingDelay::default();

        let mut gauge = Bq35100::new(&mut chip, Config::default());
        let result = gauge.init_session(&mut delay).await;

        assert!(matches!(result, Err(Error::DeviceNotReady)));
        assert_eq!(delay.delays_ms, [300, 300, 300]);
    }

    #[async_std::test]
    async fn version_queries_use_control_words() {
        init_test();

        let mut chip = SimulatedChip::new();
        let mut gauge = Bq35100::new(&mut chip, Config::default());

        assert_eq!(gauge.read_firmware_version().await.unwrap(), 0x0110);
        assert_eq!(gauge.read_hardware_version().await.unwrap(), 0x00A8);

        assert_eq!(chip.subcommands, [cntl::FW_VERSION, cntl::HW_VERSION]);
    }

    #[async_std::test]
    async fn bus_is_released_after_use() {
        init_test();

        let mut gauge = Bq35100::new(SimulatedChip::new(), Config::default());
        gauge.inner_mut().voltage_mv = 3100;

        let chip = gauge.into_inner();
        assert_eq!(chip.voltage_mv, 3100);
    }
}
