use bitflags::bitflags;

/// Privilege level enforced by the chip.
///
/// The discriminants are the codes found in the SEC field of `CONTROL_STATUS`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SecurityMode {
    /// Not yet read from the chip, or lost after a failure.
    Unknown = 0,
    FullAccess = 1,
    Unsealed = 2,
    Sealed = 3,
}

impl SecurityMode {
    pub(crate) fn from_code(code: u8) -> Self {
        match code {
            1 => SecurityMode::FullAccess,
            2 => SecurityMode::Unsealed,
            3 => SecurityMode::Sealed,
            _ => SecurityMode::Unknown,
        }
    }

    pub fn is_known(self) -> bool {
        self != SecurityMode::Unknown
    }
}

#[cfg(feature = "ufmt-impl")]
impl ufmt::uDisplay for SecurityMode {
    fn fmt<W>(&self, f: &mut ufmt::Formatter<'_, W>) -> Result<(), W::Error>
    where
        W: ufmt::uWrite + ?Sized,
    {
        f.write_str(match self {
            SecurityMode::Unknown => "Unknown",
            SecurityMode::FullAccess => "Full access",
            SecurityMode::Unsealed => "Unsealed",
            SecurityMode::Sealed => "Sealed",
        })
    }
}

bitflags! {
    /// Contents of the `CONTROL_STATUS` register.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct ControlStatus: u16 {
        /// The last data flash write failed.
        const FLASHF = 1 << 15;
        const SEC1 = 1 << 14;
        const SEC0 = 1 << 13;
        /// Initialization completed after power up or reset.
        const INITCOMP = 1 << 7;
        /// Gauging is active.
        const GA = 1 << 0;

        const _ = !0;
    }
}

impl ControlStatus {
    const SEC_SHIFT: u16 = 13;

    pub fn flash_failed(self) -> bool {
        self.contains(Self::FLASHF)
    }

    pub fn init_complete(self) -> bool {
        self.contains(Self::INITCOMP)
    }

    pub fn gauge_active(self) -> bool {
        self.contains(Self::GA)
    }

    /// Decodes the SEC field. A reading of 0 is reported as [`SecurityMode::Unknown`].
    pub fn security(self) -> SecurityMode {
        let sec = self.intersection(Self::SEC1 | Self::SEC0).bits() >> Self::SEC_SHIFT;
        SecurityMode::from_code(sec as u8)
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for ControlStatus {
    fn format(&self, f: defmt::Formatter<'_>) {
        defmt::write!(
            f,
            "ControlStatus({=u16:#x}, {})",
            self.bits(),
            self.security()
        )
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn security_field_decodes() {
        #[rustfmt::skip]
        let table = [
            (0x0000, SecurityMode::Unknown),
            (0x2000, SecurityMode::FullAccess),
            (0x4000, SecurityMode::Unsealed),
            (0x6000, SecurityMode::Sealed),
            (0xE081, SecurityMode::Sealed),
            (0x9F7F, SecurityMode::Unknown),
        ];

        for (bits, mode) in table {
            assert_eq!(ControlStatus::from_bits_retain(bits).security(), mode, "{bits:#06x}");
        }
    }

    #[test]
    fn predicates_follow_bits() {
        let status = ControlStatus::from_bits_retain(0x8081);
        assert!(status.flash_failed());
        assert!(status.init_complete());
        assert!(status.gauge_active());

        let status = ControlStatus::from_bits_retain(0x6000);
        assert!(!status.flash_failed());
        assert!(!status.init_complete());
        assert!(!status.gauge_active());
    }

    #[test]
    fn unknown_bits_are_retained() {
        assert_eq!(ControlStatus::from_bits_retain(0x0102).bits(), 0x0102);
    }
}
