use embedded_hal_async::{delay::DelayNs as AsyncDelayNs, i2c::I2c as AsyncI2c};

use crate::{
    ll::flash,
    Bq35100, Corruption, Error, IoFailure, SecurityMode,
};

/// Single-step transitions needed to get from `current` to `target`.
///
/// The chip only leaves full access through sealed, and only reaches full access
/// from unsealed. `None` means the transition is not allowed.
pub(crate) fn transition_path(
    current: SecurityMode,
    target: SecurityMode,
) -> Option<&'static [SecurityMode]> {
    use SecurityMode::*;

    match (current, target) {
        (_, Unknown) | (Unknown, _) => None,
        (current, target) if current == target => Some(&[]),
        (FullAccess, Unsealed) => Some(&[Sealed, Unsealed]),
        (Sealed, FullAccess) => Some(&[Unsealed, FullAccess]),
        (_, Sealed) => Some(&[Sealed]),
        (_, Unsealed) => Some(&[Unsealed]),
        (_, FullAccess) => Some(&[FullAccess]),
    }
}

impl<I> Bq35100<I>
where
    I: AsyncI2c,
{
    /// Moves the chip into `target`, passing through intermediate modes if needed.
    pub async fn set_security_mode(
        &mut self,
        target: SecurityMode,
        delay: &mut impl AsyncDelayNs,
    ) -> Result<(), Error<I::Error>> {
        let Some(path) = transition_path(self.security, target) else {
            logger::error!(
                "Invalid security transition {:?} -> {:?}",
                self.security,
                target
            );
            return Err(Error::InvalidState);
        };

        for &step in path {
            self.enter_security_mode(step, delay).await?;
        }

        Ok(())
    }

    pub async fn seal(&mut self, delay: &mut impl AsyncDelayNs) -> Result<(), Error<I::Error>> {
        self.set_security_mode(SecurityMode::Sealed, delay).await
    }

    // The chip sometimes refuses a security change requested shortly after the
    // previous one, so each step is retried until the status register agrees.
    async fn enter_security_mode(
        &mut self,
        mode: SecurityMode,
        delay: &mut impl AsyncDelayNs,
    ) -> Result<(), Error<I::Error>> {
        let attempts = self.config.max_retries;

        for attempt in 1..=attempts {
            logger::debug!("Setting security to {:?}", mode);
            self.send_security_command(mode, delay).await?;

            let observed = self.read_status().await?.security();
            self.security = observed;

            if observed == mode {
                logger::debug!("Security mode set");
                return Ok(());
            }

            logger::warn!(
                "Security mode set failed (wanted {:?}, got {:?}), attempt {}/{}",
                mode,
                observed,
                attempt,
                attempts
            );

            if attempt < attempts {
                delay.delay_ms(self.config.flash_write_delay_ms).await;
            }
        }

        logger::error!("Unable to set security mode {:?}", mode);
        Err(Error::Io(IoFailure::SecurityVerification))
    }

    async fn send_security_command(
        &mut self,
        mode: SecurityMode,
        delay: &mut impl AsyncDelayNs,
    ) -> Result<(), Error<I::Error>> {
        match mode {
            SecurityMode::Sealed => self
                .driver
                .sealed()
                .dispatch_async()
                .await
                .map_err(Error::Transport),
            SecurityMode::Unsealed => self.send_key(self.config.unseal_key, delay).await,
            SecurityMode::FullAccess => {
                let key = self.read_full_access_key().await?;
                self.send_key(key, delay).await
            }
            SecurityMode::Unknown => Err(Error::InvalidState),
        }
    }

    /// Writes a 32-bit key as two control words, most significant word first.
    async fn send_key(
        &mut self,
        key: u32,
        delay: &mut impl AsyncDelayNs,
    ) -> Result<(), Error<I::Error>> {
        let high = (key >> 16) as u16;
        let low = key as u16;

        self.driver
            .control()
            .write_async(|reg| reg.set_word(high))
            .await
            .map_err(Error::Transport)?;

        delay.delay_ms(self.config.flash_write_delay_ms).await;

        self.driver
            .control()
            .write_async(|reg| reg.set_word(low))
            .await
            .map_err(Error::Transport)
    }

    async fn read_full_access_key(&mut self) -> Result<u32, Error<I::Error>> {
        let mut key = [0; 4];

        let len = self.read_block(flash::FULL_ACCESS_CODES, &mut key).await?;
        if len != key.len() {
            logger::error!("Could not get full access codes");
            return Err(Error::DataCorruption(Corruption::InvalidLength));
        }

        Ok(u32::from_be_bytes(key))
    }

    /// Unseals the chip if it is sealed. Returns the mode to restore afterwards.
    pub(crate) async fn unseal_temporarily(
        &mut self,
        delay: &mut impl AsyncDelayNs,
    ) -> Result<SecurityMode, Error<I::Error>> {
        let previous = self.security;

        if previous == SecurityMode::Sealed
            && self
                .set_security_mode(SecurityMode::Unsealed, delay)
                .await
                .is_err()
        {
            logger::error!("Unable to set security mode Unsealed");
            return Err(Error::PermissionDenied);
        }

        Ok(previous)
    }

    /// Returns to `previous` after an operation that produced `result`.
    ///
    /// A failed restore replaces `result`, keeping its kind in the returned error.
    pub(crate) async fn restore_security_mode<T>(
        &mut self,
        previous: SecurityMode,
        result: Result<T, Error<I::Error>>,
        delay: &mut impl AsyncDelayNs,
    ) -> Result<T, Error<I::Error>> {
        if self.security == previous {
            return result;
        }

        match self.set_security_mode(previous, delay).await {
            Ok(()) => result,
            Err(restore) => {
                logger::error!("Unable to restore security mode {:?}", previous);
                Err(Error::RestoreFailed {
                    mode: previous,
                    primary: result.err().map(|e| e.kind()),
                    restore: restore.kind(),
                })
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::transition_path;
    use crate::{
        test::{cntl, init_test, RecordingDelay, SimulatedChip},
        Bq35100, Config, Error, ErrorKind, IoFailure,
        SecurityMode::{self, *},
    };

    #[test]
    fn transition_table() {
        #[rustfmt::skip]
        let table: [(SecurityMode, SecurityMode, Option<&[SecurityMode]>); 12] = [
            (Sealed,     Sealed,     Some(&[])),
            (Sealed,     Unsealed,   Some(&[Unsealed])),
            (Sealed,     FullAccess, Some(&[Unsealed, FullAccess])),
            (Unsealed,   Sealed,     Some(&[Sealed])),
            (Unsealed,   Unsealed,   Some(&[])),
            (Unsealed,   FullAccess, Some(&[FullAccess])),
            (FullAccess, Sealed,     Some(&[Sealed])),
            (FullAccess, Unsealed,   Some(&[Sealed, Unsealed])),
            (FullAccess, FullAccess, Some(&[])),
            (Sealed,     Unknown,    None),
            (Unknown,    Unknown,    None),
            (Unknown,    Sealed,     None),
        ];

        for (current, target, path) in table {
            assert_eq!(transition_path(current, target), path, "{current:?} -> {target:?}");
        }
    }

    async fn session(chip: &mut SimulatedChip) -> Bq35100<&mut SimulatedChip> {
        let mut gauge = Bq35100::new(chip, Config::default());
        gauge
            .init_session(&mut RecordingDelay::default())
            .await
            .unwrap();
        gauge
    }

    #[async_std::test]
    async fn unseal_sends_key_in_two_words() {
        init_test();

        let mut chip = SimulatedChip::new();
        let mut delay = RecordingDelay::default();

        let mut gauge = session(&mut chip).await;
        gauge.set_security_mode(Unsealed, &mut delay).await.unwrap();
        assert_eq!(gauge.security_mode(), Unsealed);

        assert_eq!(delay.delays_ms, [100]);
        assert_eq!(chip.subcommands, [cntl::DEVICE_TYPE, 0x0414, 0x3672]);
        assert_eq!(chip.security_history, [Unsealed]);
    }

    #[async_std::test]
    async fn full_access_from_sealed_passes_through_unsealed() {
        init_test();

        let mut chip = SimulatedChip::new();
        chip.set_full_access_key(0x1234_ABCD);
        let mut delay = RecordingDelay::default();

        let mut gauge = session(&mut chip).await;
        gauge.set_security_mode(FullAccess, &mut delay).await.unwrap();
        assert_eq!(gauge.security_mode(), FullAccess);

        assert_eq!(
            chip.subcommands,
            [cntl::DEVICE_TYPE, 0x0414, 0x3672, 0x1234, 0xABCD]
        );
        assert_eq!(chip.security_history, [Unsealed, FullAccess]);
    }

    #[async_std::test]
    async fn unsealed_from_full_access_passes_through_sealed() {
        init_test();

        let mut chip = SimulatedChip::new();
        chip.security = FullAccess;
        let mut delay = RecordingDelay::default();

        let mut gauge = session(&mut chip).await;
        gauge.set_security_mode(Unsealed, &mut delay).await.unwrap();
        assert_eq!(gauge.security_mode(), Unsealed);

        assert_eq!(
            chip.subcommands,
            [cntl::DEVICE_TYPE, cntl::SEALED, 0x0414, 0x3672]
        );
        assert_eq!(chip.security_history, [Sealed, Unsealed]);
    }

    #[async_std::test]
    async fn same_mode_is_a_no_op() {
        init_test();

        let mut chip = SimulatedChip::new();
        let mut delay = RecordingDelay::default();

        let mut gauge = session(&mut chip).await;
        gauge.set_security_mode(Sealed, &mut delay).await.unwrap();

        assert_eq!(chip.subcommands, [cntl::DEVICE_TYPE]);
    }

    #[async_std::test]
    async fn unknown_target_is_rejected() {
        init_test();

        let mut chip = SimulatedChip::new();
        let mut delay = RecordingDelay::default();

        let mut gauge = session(&mut chip).await;
        let result = gauge.set_security_mode(Unknown, &mut delay).await;

        assert!(matches!(result, Err(Error::InvalidState)));
        assert_eq!(gauge.security_mode(), Sealed);
    }

    #[async_std::test]
    async fn uninitialized_session_cannot_transition() {
        init_test();

        let mut chip = SimulatedChip::new();
        let mut delay = RecordingDelay::default();

        let mut gauge = Bq35100::new(&mut chip, Config::default());
        let result = gauge.set_security_mode(Unsealed, &mut delay).await;

        assert!(matches!(result, Err(Error::InvalidState)));
        assert!(chip.subcommands.is_empty());
    }

    #[async_std::test]
    async fn rejected_change_is_retried() {
        init_test();

        let mut chip = SimulatedChip::new();
        chip.reject_security_changes = 2;
        let mut delay = RecordingDelay::default();

        let mut gauge = session(&mut chip).await;
        gauge.set_security_mode(Unsealed, &mut delay).await.unwrap();

        assert_eq!(gauge.security_mode(), Unsealed);
        // key split delay on each attempt, retry delay after each rejection
        assert_eq!(delay.delays_ms, [100, 100, 100, 100, 100]);
    }

    #[async_std::test]
    async fn persistent_rejection_fails_verification() {
        init_test();

        let mut chip = SimulatedChip::new();
        chip.reject_security_changes = u32::MAX;
        let mut delay = RecordingDelay::default();

        let mut gauge = session(&mut chip).await;
        let result = gauge.set_security_mode(Unsealed, &mut delay).await;

        assert!(matches!(
            result,
            Err(Error::Io(IoFailure::SecurityVerification))
        ));
        assert_eq!(gauge.security_mode(), Sealed);
        assert_eq!(chip.subcommands.len(), 1 + 3 * 2);
    }

    #[async_std::test]
    async fn bus_error_is_not_retried() {
        init_test();

        let mut chip = SimulatedChip::new();
        chip.security = Unsealed;
        chip.fail_subcommand = Some(cntl::SEALED);
        let mut delay = RecordingDelay::default();

        let mut gauge = session(&mut chip).await;
        let result = gauge.seal(&mut delay).await;

        assert_eq!(result.unwrap_err().kind(), ErrorKind::Transport);
        assert!(delay.delays_ms.is_empty());
    }
}
