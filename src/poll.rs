use embedded_hal_async::{delay::DelayNs as AsyncDelayNs, i2c::I2c as AsyncI2c};

use crate::{status::ControlStatus, Bq35100, Error};

impl<I> Bq35100<I>
where
    I: AsyncI2c,
{
    /// Polls `CONTROL_STATUS` until `status & mask == expected`.
    ///
    /// The register is read at most `max_retries` times, sleeping `interval_ms` after
    /// every mismatch. Bus errors end the wait immediately.
    pub async fn wait_for_status(
        &mut self,
        expected: ControlStatus,
        mask: ControlStatus,
        interval_ms: u32,
        delay: &mut impl AsyncDelayNs,
    ) -> Result<ControlStatus, Error<I::Error>> {
        let mut last = ControlStatus::empty();

        for _ in 0..self.config.max_retries {
            last = self.read_status().await?;

            if last.intersection(mask) == expected {
                logger::debug!("Status match");
                return Ok(last);
            }

            logger::warn!(
                "Status not yet in requested state, read: {:#x} expected: {:#x}",
                last.bits(),
                expected.bits()
            );
            delay.delay_ms(interval_ms).await;
        }

        logger::error!(
            "Status not in requested state, read: {:#x} expected: {:#x}",
            last.bits(),
            expected.bits()
        );

        Err(Error::Timeout)
    }
}
