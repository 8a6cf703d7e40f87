//! Data flash access through the MAC block protocol.

use embedded_hal_async::{delay::DelayNs as AsyncDelayNs, i2c::I2c as AsyncI2c};

use crate::{
    checksum,
    ll::{flash, reg, MAC_COMPLETE_LEN, MAC_DATA_LEN, MAC_OVERHEAD_LEN},
    Bq35100, Corruption, Error, IoFailure, SecurityMode,
};

impl<I> Bq35100<I>
where
    I: AsyncI2c,
{
    /// Writes 1 to 32 bytes of data flash at `address`.
    ///
    /// A sealed chip is unsealed for the duration of the write and sealed again
    /// afterwards, whether or not the write succeeded.
    pub async fn write_extended(
        &mut self,
        address: u16,
        data: &[u8],
        delay: &mut impl AsyncDelayNs,
    ) -> Result<(), Error<I::Error>> {
        self.check_block_access(address)?;

        if data.is_empty() || data.len() > MAC_DATA_LEN {
            logger::error!("Invalid payload length {}", data.len());
            return Err(Error::InvalidArgument);
        }

        let previous = self.unseal_temporarily(delay).await?;
        let result = self.write_block(address, data, delay).await;
        self.restore_security_mode(previous, result, delay).await
    }

    /// Reads data flash at `address` into `data`, returning the number of bytes copied.
    ///
    /// At most 32 bytes are returned by the chip; the rest of `data` is left untouched.
    pub async fn read_extended(
        &mut self,
        address: u16,
        data: &mut [u8],
        delay: &mut impl AsyncDelayNs,
    ) -> Result<usize, Error<I::Error>> {
        self.check_block_access(address)?;

        let previous = self.unseal_temporarily(delay).await?;
        let result = self.read_block(address, data).await;
        self.restore_security_mode(previous, result, delay).await
    }

    fn check_block_access(&self, address: u16) -> Result<(), Error<I::Error>> {
        if self.security == SecurityMode::Unknown {
            logger::error!("Security mode unknown");
            return Err(Error::InvalidArgument);
        }

        if !flash::WINDOW.contains(&address) {
            logger::error!("Address {:#x} is outside of data flash", address);
            return Err(Error::InvalidArgument);
        }

        Ok(())
    }

    async fn write_block(
        &mut self,
        address: u16,
        data: &[u8],
        delay: &mut impl AsyncDelayNs,
    ) -> Result<(), Error<I::Error>> {
        logger::debug!("Writing {} byte(s) to address {:#x}", data.len(), address);
        logger::trace!("Payload: {}", logger::Hex(data));

        let mut buffer = [0; 2 + MAC_DATA_LEN];
        let block_len = 2 + data.len();

        buffer[..2].copy_from_slice(&address.to_le_bytes());
        buffer[2..block_len].copy_from_slice(data);
        let block = &buffer[..block_len];

        self.driver
            .interface()
            .write_raw(reg::MAC, block)
            .await
            .map_err(Error::Transport)?;

        delay.delay_ms(self.config.flash_write_delay_ms).await;

        // MAC_DATA_SUM and MAC_DATA_LEN are adjacent, one write sets both.
        let trailer = [checksum(block), (data.len() + MAC_OVERHEAD_LEN) as u8];
        self.driver
            .interface()
            .write_raw(reg::MAC_DATA_SUM, &trailer)
            .await
            .map_err(Error::Transport)?;

        delay.delay_ms(self.config.flash_write_delay_ms).await;

        if self.read_status().await?.flash_failed() {
            logger::error!("Write to {:#x} failed", address);
            return Err(Error::Io(IoFailure::FlashWriteRejected));
        }

        logger::debug!("Write successful");

        Ok(())
    }

    /// Block read without any security handling. The caller must have access.
    pub(crate) async fn read_block(
        &mut self,
        address: u16,
        data: &mut [u8],
    ) -> Result<usize, Error<I::Error>> {
        logger::debug!("Reading up to {} byte(s) from address {:#x}", data.len(), address);

        let requested = address.to_le_bytes();

        self.driver
            .interface()
            .write_raw(reg::MAC, &requested)
            .await
            .map_err(Error::Transport)?;

        let mut buffer = [0; MAC_COMPLETE_LEN];
        self.driver
            .interface()
            .read_raw(reg::MAC, &mut buffer)
            .await
            .map_err(Error::Transport)?;

        if buffer[..2] != requested {
            logger::error!(
                "Address didn't match (expected {:#x}, received {:#x})",
                address,
                u16::from_le_bytes([buffer[0], buffer[1]])
            );
            return Err(Error::DataCorruption(Corruption::AddressMismatch));
        }

        let [.., sum, len] = buffer;
        let len = len as usize;

        if !(MAC_OVERHEAD_LEN..=MAC_COMPLETE_LEN).contains(&len) {
            logger::error!("Invalid block length {}", len);
            return Err(Error::DataCorruption(Corruption::InvalidLength));
        }

        // The length counts the checksum and length bytes themselves.
        if sum != checksum(&buffer[..len - 2]) {
            logger::error!("Checksum didn't match ({:#x} expected)", sum);
            return Err(Error::DataCorruption(Corruption::ChecksumMismatch));
        }

        let count = (len - MAC_OVERHEAD_LEN).min(data.len());
        data[..count].copy_from_slice(&buffer[2..2 + count]);

        logger::trace!("Data read: {}", logger::Hex(&data[..count]));

        Ok(count)
    }
}
