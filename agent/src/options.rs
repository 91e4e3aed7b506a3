/*!
Per-channel configuration, set and read through [`crate::channel::Channel::setopt`]
and [`crate::channel::Channel::getopt`]. Every option that feeds a primary or
extension block field triggers a header re-initialization when changed.
*/

use bp6_codec::{crc::CrcType, eid::Eid};

/// What a channel does when its active custody table is full and `load`
/// needs a fresh slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WrapPolicy {
    /// Retrieve and re-emit the occupant of the colliding slot (retransmit it).
    #[default]
    Resend,
    /// Return `Overflow` and leave the new bundle queued.
    Block,
    /// Relinquish the occupant, vacate its slot, and take the slot for the new bundle.
    Drop,
}

/// Per-channel options, read and written through a `setopt`/`getopt` pair.
#[derive(Debug, Clone, PartialEq)]
pub struct Options {
    pub source: Eid,
    pub destination: Eid,
    pub report_to: Eid,
    pub custodian: Eid,

    /// When set, `store` stamps each outbound bundle's creation time from
    /// the injected [`crate::platform::Clock`] rather than leaving it at zero.
    pub use_system_time: bool,
    pub lifetime_secs: u64,
    pub request_custody: bool,
    pub allow_fragmentation: bool,
    pub crc_type: CrcType,

    /// Default timeout, in milliseconds, for store-adapter calls this
    /// channel makes when the caller doesn't override it.
    pub timeout_ms: u64,
    pub max_bundle_length: usize,
    pub max_fragment_length: usize,
    /// When set, `process` rejects (`Ignore`) any non-administrative bundle.
    pub admin_only: bool,
    pub wrap_response: WrapPolicy,
    /// How often an ACS accumulator is flushed even without an overflow
    /// condition forcing it — see [`crate::custody`] and the `tick` design note.
    pub acs_rate_ms: u64,

    /// Size of the active-custody table, `N` in `cid mod N`. Fixed for the
    /// channel's lifetime; set at [`crate::channel::Channel::open`] time.
    pub active_table_size: usize,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            source: Eid::NULL,
            destination: Eid::NULL,
            report_to: Eid::NULL,
            custodian: Eid::NULL,
            use_system_time: true,
            lifetime_secs: 3600,
            request_custody: false,
            allow_fragmentation: false,
            crc_type: CrcType::Crc16,
            timeout_ms: 10_000,
            max_bundle_length: 4096,
            max_fragment_length: 4096,
            admin_only: true,
            wrap_response: WrapPolicy::Resend,
            acs_rate_ms: 1000,
            active_table_size: 256,
        }
    }
}
