/*!
The Primary Block's processing control flags (RFC 5050 §4.3). Only the
subset this codec actually branches on is modelled as named bits; everything
else observed on the wire is preserved in `unrecognised` so a round-trip
through this codec never silently drops bits a peer set.
*/

/// Bit position of "bundle is a fragment".
const IS_FRAGMENT: u32 = 0;
/// Bit position of "payload is an administrative record".
const IS_ADMIN_RECORD: u32 = 1;
/// Bit position of "bundle must not be fragmented".
const DO_NOT_FRAGMENT: u32 = 2;
/// Bit position of "custody transfer is requested".
const REQUEST_CUSTODY: u32 = 3;
/// Bit position of "destination endpoint is a singleton".
const DESTINATION_SINGLETON: u32 = 4;
/// Bit position of "report bundle deletion to report-to EID".
const REPORT_DELETION: u32 = 18;

const KNOWN_MASK: u64 = (1 << IS_FRAGMENT)
    | (1 << IS_ADMIN_RECORD)
    | (1 << DO_NOT_FRAGMENT)
    | (1 << REQUEST_CUSTODY)
    | (1 << DESTINATION_SINGLETON)
    | (1 << REPORT_DELETION);

/// The primary block's processing control flags.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BundleFlags {
    pub is_fragment: bool,
    pub is_admin_record: bool,
    pub do_not_fragment: bool,
    pub request_custody: bool,
    pub destination_singleton: bool,
    pub report_deletion: bool,
    /// Any bits this codec does not interpret, preserved verbatim.
    pub unrecognised: u64,
}

impl BundleFlags {
    /// `true` when fragmentation is permitted (the inverse of `do_not_fragment`).
    pub fn allow_fragmentation(&self) -> bool {
        !self.do_not_fragment
    }
}

impl From<u64> for BundleFlags {
    fn from(bits: u64) -> Self {
        Self {
            is_fragment: bits & (1 << IS_FRAGMENT) != 0,
            is_admin_record: bits & (1 << IS_ADMIN_RECORD) != 0,
            do_not_fragment: bits & (1 << DO_NOT_FRAGMENT) != 0,
            request_custody: bits & (1 << REQUEST_CUSTODY) != 0,
            destination_singleton: bits & (1 << DESTINATION_SINGLETON) != 0,
            report_deletion: bits & (1 << REPORT_DELETION) != 0,
            unrecognised: bits & !KNOWN_MASK,
        }
    }
}

impl From<BundleFlags> for u64 {
    fn from(f: BundleFlags) -> Self {
        let mut bits = f.unrecognised;
        if f.is_fragment {
            bits |= 1 << IS_FRAGMENT;
        }
        if f.is_admin_record {
            bits |= 1 << IS_ADMIN_RECORD;
        }
        if f.do_not_fragment {
            bits |= 1 << DO_NOT_FRAGMENT;
        }
        if f.request_custody {
            bits |= 1 << REQUEST_CUSTODY;
        }
        if f.destination_singleton {
            bits |= 1 << DESTINATION_SINGLETON;
        }
        if f.report_deletion {
            bits |= 1 << REPORT_DELETION;
        }
        bits
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_u64() {
        let flags = BundleFlags {
            is_admin_record: true,
            request_custody: true,
            destination_singleton: true,
            ..Default::default()
        };
        let bits: u64 = flags.into();
        assert_eq!(BundleFlags::from(bits), flags);
    }

    #[test]
    fn preserves_unrecognised_bits() {
        let bits = (1 << REQUEST_CUSTODY) | (1 << 10);
        let flags = BundleFlags::from(bits);
        assert!(flags.request_custody);
        assert_eq!(flags.unrecognised, 1 << 10);
        let round_tripped: u64 = flags.into();
        assert_eq!(round_tripped, bits);
    }

    #[test]
    fn allow_fragmentation_is_inverse_of_do_not_fragment() {
        let mut flags = BundleFlags::default();
        assert!(flags.allow_fragmentation());
        flags.do_not_fragment = true;
        assert!(!flags.allow_fragmentation());
    }
}
