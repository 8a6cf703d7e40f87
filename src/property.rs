use embedded_hal_async::{delay::DelayNs as AsyncDelayNs, i2c::I2c as AsyncI2c};

use crate::{
    ll::flash,
    status::ControlStatus,
    Bq35100, Error, SecurityMode,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Property {
    Voltage,
    Current,
    Temperature,
    DesignCapacity,
    RemainingCapacity,
    StateOfCharge,
    /// Resets the accumulated capacity and programs a new design capacity.
    /// Takes a [`PropertyValue::DesignCapacity`].
    NewBattery,
    Reset,
    StartGauge,
    StopGauge,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PropertyValue {
    /// μV
    Voltage(i32),
    /// μA, negative while discharging
    Current(i32),
    /// 0.1 K
    Temperature(u16),
    /// mAh
    DesignCapacity(u16),
    /// μAh
    RemainingCapacity(u32),
    /// %
    StateOfCharge(u8),
    /// For properties that are commands.
    None,
}

#[cfg(feature = "ufmt-impl")]
impl ufmt::uDisplay for PropertyValue {
    fn fmt<W>(&self, f: &mut ufmt::Formatter<'_, W>) -> Result<(), W::Error>
    where
        W: ufmt::uWrite + ?Sized,
    {
        match *self {
            PropertyValue::Voltage(uv) => ufmt::uwrite!(f, "{}uV", uv),
            PropertyValue::Current(ua) => ufmt::uwrite!(f, "{}uA", ua),
            PropertyValue::Temperature(dk) => ufmt::uwrite!(f, "{}dK", dk),
            PropertyValue::DesignCapacity(mah) => ufmt::uwrite!(f, "{}mAh", mah),
            PropertyValue::RemainingCapacity(uah) => ufmt::uwrite!(f, "{}uAh", uah),
            PropertyValue::StateOfCharge(percent) => ufmt::uwrite!(f, "{}%", percent),
            PropertyValue::None => Ok(()),
        }
    }
}

/// Remaining capacity in μAh from the design capacity and the accumulated charge.
///
/// The result is clamped to `0..=design capacity`. A non-positive design capacity
/// yields 0.
///
/// ```rust
/// # use bq35100::remaining_capacity_uah;
/// assert_eq!(remaining_capacity_uah(2000, -500_000), 1_500_000);
/// assert_eq!(remaining_capacity_uah(2000, -3_000_000), 0);
/// assert_eq!(remaining_capacity_uah(2000, 10_000), 2_000_000);
/// ```
pub fn remaining_capacity_uah(design_capacity_mah: i16, accumulated_uah: i32) -> u32 {
    if design_capacity_mah <= 0 {
        return 0;
    }

    let design_uah = design_capacity_mah as i64 * 1000;
    let remaining = design_uah + accumulated_uah as i64;

    remaining.clamp(0, design_uah) as u32
}

/// State of charge in %, rounded down.
///
/// ```rust
/// # use bq35100::state_of_charge;
/// assert_eq!(state_of_charge(2000, 1_500_000), 75);
/// assert_eq!(state_of_charge(0, 1_500_000), 0);
/// ```
pub fn state_of_charge(design_capacity_mah: i16, remaining_uah: u32) -> u8 {
    if design_capacity_mah <= 0 {
        return 0;
    }

    let percent = remaining_uah as i64 * 100 / (design_capacity_mah as i64 * 1000);

    percent.clamp(0, 100) as u8
}

impl<I> Bq35100<I>
where
    I: AsyncI2c,
{
    pub async fn get_property(
        &mut self,
        property: Property,
    ) -> Result<PropertyValue, Error<I::Error>> {
        let value = match property {
            Property::Voltage => {
                let reg = self.driver.voltage().read_async().await;
                let mv = reg.map_err(Error::Transport)?.voltage();
                PropertyValue::Voltage(mv as i32 * 1000)
            }
            Property::Current => {
                let reg = self.driver.current().read_async().await;
                let ma = reg.map_err(Error::Transport)?.current();
                PropertyValue::Current(ma as i32 * 1000)
            }
            Property::Temperature => {
                let reg = self.driver.temperature().read_async().await;
                PropertyValue::Temperature(reg.map_err(Error::Transport)?.temperature())
            }
            Property::DesignCapacity => {
                let reg = self.driver.design_capacity().read_async().await;
                PropertyValue::DesignCapacity(reg.map_err(Error::Transport)?.capacity())
            }
            Property::RemainingCapacity | Property::StateOfCharge => {
                let (design, accumulated) = self.read_capacity_registers().await?;
                let remaining = remaining_capacity_uah(design, accumulated);

                if property == Property::RemainingCapacity {
                    PropertyValue::RemainingCapacity(remaining)
                } else {
                    PropertyValue::StateOfCharge(state_of_charge(design, remaining))
                }
            }
            _ => return Err(Error::Unsupported),
        };

        Ok(value)
    }

    pub async fn set_property(
        &mut self,
        property: Property,
        value: PropertyValue,
        delay: &mut impl AsyncDelayNs,
    ) -> Result<(), Error<I::Error>> {
        match (property, value) {
            (Property::DesignCapacity, PropertyValue::DesignCapacity(mah)) => {
                logger::debug!("Setting design capacity");
                self.set_design_capacity(mah, delay).await
            }
            (Property::NewBattery, PropertyValue::DesignCapacity(mah)) => {
                logger::debug!("Setting new battery");
                self.new_battery(mah, delay).await
            }
            (Property::DesignCapacity | Property::NewBattery, _) => {
                logger::error!("{:?} requires a design capacity", property);
                Err(Error::InvalidArgument)
            }
            (Property::Reset, _) => {
                logger::debug!("Resetting BQ35100");
                self.reset(delay).await
            }
            (Property::StartGauge, _) => {
                logger::debug!("Setting gauge start");
                self.start_gauge(delay).await
            }
            (Property::StopGauge, _) => {
                logger::debug!("Setting gauge stop");
                self.stop_gauge(delay).await
            }
            _ => Err(Error::Unsupported),
        }
    }

    async fn read_capacity_registers(&mut self) -> Result<(i16, i32), Error<I::Error>> {
        let accumulated = self
            .driver
            .accumulated_capacity()
            .read_async()
            .await
            .map_err(Error::Transport)?;
        let design = self
            .driver
            .design_capacity()
            .read_async()
            .await
            .map_err(Error::Transport)?;

        // The capacity math treats a design capacity with the top bit set as invalid.
        Ok((design.capacity() as i16, accumulated.capacity()))
    }

    /// Programs the design capacity in mAh into data flash.
    pub async fn set_design_capacity(
        &mut self,
        capacity_mah: u16,
        delay: &mut impl AsyncDelayNs,
    ) -> Result<(), Error<I::Error>> {
        self.write_extended(flash::DESIGN_CAPACITY, &capacity_mah.to_be_bytes(), delay)
            .await
    }

    /// Tells the gauge a fresh battery was inserted.
    ///
    /// The chip clears its accumulator on NEW_BATTERY and expects the capacity of the
    /// new cell to follow.
    pub async fn new_battery(
        &mut self,
        capacity_mah: u16,
        delay: &mut impl AsyncDelayNs,
    ) -> Result<(), Error<I::Error>> {
        if let Err(e) = self.driver.new_battery().dispatch_async().await {
            logger::error!("Error setting new battery");
            return Err(Error::Transport(e));
        }

        delay
            .delay_ms(self.config.flash_write_delay_ms.saturating_mul(2))
            .await;

        if let Err(e) = self.set_design_capacity(capacity_mah, delay).await {
            logger::error!("Error setting new design capacity");
            return Err(e);
        }

        delay.delay_ms(self.config.new_battery_delay_ms).await;

        Ok(())
    }

    /// Resets the chip. The security mode needs to be re-learned by
    /// [`Bq35100::init_session`] afterwards.
    pub async fn reset(&mut self, delay: &mut impl AsyncDelayNs) -> Result<(), Error<I::Error>> {
        if self.security == SecurityMode::Sealed
            && self
                .set_security_mode(SecurityMode::Unsealed, delay)
                .await
                .is_err()
        {
            logger::error!("Unable to set security mode Unsealed");
            return Err(Error::PermissionDenied);
        }

        if let Err(e) = self.driver.reset().dispatch_async().await {
            logger::error!("Unable to reset device");
            return Err(Error::Transport(e));
        }

        self.security = SecurityMode::Unknown;

        Ok(())
    }

    pub async fn start_gauge(
        &mut self,
        delay: &mut impl AsyncDelayNs,
    ) -> Result<(), Error<I::Error>> {
        self.driver
            .gauge_start()
            .dispatch_async()
            .await
            .map_err(Error::Transport)?;

        let interval = self.config.gauge_poll_interval_ms;
        if let Err(e) = self
            .wait_for_status(ControlStatus::GA, ControlStatus::GA, interval, delay)
            .await
        {
            logger::error!("Error enabling gauge");
            return Err(e);
        }

        Ok(())
    }

    pub async fn stop_gauge(&mut self, delay: &mut impl AsyncDelayNs) -> Result<(), Error<I::Error>> {
        self.driver
            .gauge_stop()
            .dispatch_async()
            .await
            .map_err(Error::Transport)?;

        let interval = self.config.gauge_poll_interval_ms;
        if let Err(e) = self
            .wait_for_status(ControlStatus::empty(), ControlStatus::GA, interval, delay)
            .await
        {
            logger::error!("Error disabling gauge");
            return Err(e);
        }

        Ok(())
    }
}
