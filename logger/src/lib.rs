#![no_std]

use core::fmt;

#[macro_export]
macro_rules! trace {
    ($($args:tt)*) => {
        #[cfg(feature = "defmt")]
        defmt::trace!($($args)*);
        #[cfg(feature = "log")]
        log::trace!($($args)*);
    }
}

#[macro_export]
macro_rules! debug {
    ($($args:tt)*) => {
        #[cfg(feature = "defmt")]
        defmt::debug!($($args)*);
        #[cfg(feature = "log")]
        log::debug!($($args)*);
    }
}

#[macro_export]
macro_rules! info {
    ($($args:tt)*) => {
        #[cfg(feature = "defmt")]
        defmt::info!($($args)*);
        #[cfg(feature = "log")]
        log::info!($($args)*);
    }
}

#[macro_export]
macro_rules! warn {
    ($($args:tt)*) => {
        #[cfg(feature = "defmt")]
        defmt::warn!($($args)*);
        #[cfg(feature = "log")]
        log::warn!($($args)*);
    }
}

#[macro_export]
macro_rules! error {
    ($($args:tt)*) => {
        #[cfg(feature = "defmt")]
        defmt::error!($($args)*);
        #[cfg(feature = "log")]
        log::error!($($args)*);
    }
}

/// Formats a byte slice as space separated hex octets, e.g. `3E 00 40`.
///
/// Meant for tracing raw bus traffic through the macros above with `{}`.
#[derive(Clone, Copy)]
pub struct Hex<'a>(pub &'a [u8]);

impl fmt::Display for Hex<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut bytes = self.0.iter();

        if let Some(first) = bytes.next() {
            write!(f, "{first:02X}")?;
            for byte in bytes {
                write!(f, " {byte:02X}")?;
            }
        }

        Ok(())
    }
}

impl fmt::Debug for Hex<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self)
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for Hex<'_> {
    fn format(&self, f: defmt::Formatter<'_>) {
        defmt::write!(f, "{=[u8]:X}", self.0)
    }
}
