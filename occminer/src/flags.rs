use crate::errors::{ExtractError, ExtractResult};

/// Keep occurrences that lie inside another occurrence of the same batch.
/// When unset, only outermost occurrences survive a batch.
pub const E_NO_ENCLOSED_OCCURRENCES: u32 = 1 << 0;

/// Sort each batch ascending by byte offset, then by byte length.
pub const E_SORT_RESULTS: u32 = 1 << 1;

const KNOWN_FLAGS: u32 = E_NO_ENCLOSED_OCCURRENCES | E_SORT_RESULTS;

/// Validated flag bitmask of an extractor
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExtractFlags(u32);

impl ExtractFlags {
    /// Builds a flag set, rejecting bits the engine does not recognise
    pub fn new(bits: u32) -> ExtractResult<Self> {
        check_known(bits)?;
        Ok(Self(bits))
    }

    pub fn bits(self) -> u32 {
        self.0
    }

    pub fn set(&mut self, bits: u32) -> ExtractResult<()> {
        check_known(bits)?;
        self.0 |= bits;
        Ok(())
    }

    pub fn unset(&mut self, bits: u32) -> ExtractResult<()> {
        check_known(bits)?;
        self.0 &= !bits;
        Ok(())
    }

    /// Whether enclosed occurrences are dropped from each batch
    pub fn filters_enclosed(self) -> bool {
        self.0 & E_NO_ENCLOSED_OCCURRENCES == 0
    }

    pub fn sorts_results(self) -> bool {
        self.0 & E_SORT_RESULTS != 0
    }
}

fn check_known(bits: u32) -> ExtractResult<()> {
    let unknown = bits & !KNOWN_FLAGS;
    if unknown != 0 {
        return Err(ExtractError::config(format!(
            "unknown flag bits {:#x}",
            unknown
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_filters_and_does_not_sort() {
        let flags = ExtractFlags::default();
        assert!(flags.filters_enclosed());
        assert!(!flags.sorts_results());
    }

    #[test]
    fn test_set_and_unset() {
        let mut flags = ExtractFlags::new(0).unwrap();
        flags.set(E_SORT_RESULTS).unwrap();
        assert!(flags.sorts_results());
        flags.set(E_NO_ENCLOSED_OCCURRENCES).unwrap();
        assert!(!flags.filters_enclosed());
        assert_eq!(flags.bits(), 0b11);

        flags.unset(E_SORT_RESULTS).unwrap();
        assert_eq!(flags.bits(), E_NO_ENCLOSED_OCCURRENCES);
    }

    #[test]
    fn test_unknown_bits_rejected() {
        assert!(matches!(ExtractFlags::new(1 << 5), Err(ExtractError::Config(_))));

        let mut flags = ExtractFlags::new(E_SORT_RESULTS).unwrap();
        let err = flags.set(E_SORT_RESULTS | 1 << 2).unwrap_err();
        assert_eq!(err.to_string(), "Configuration error: unknown flag bits 0x4");
        // A rejected call leaves the mask untouched
        assert_eq!(flags.bits(), E_SORT_RESULTS);
        assert!(flags.unset(1 << 31).is_err());
    }
}
