/*!
The operational error type and advisory flag word for `bp6-agent`.

Fatal conditions are returned as [`Error`]; advisory conditions are OR-ed
into a [`Flags`] word the caller passes in by `&mut` reference — a returned
status code plus an out-parameter flag word, rather than bundling both into
one error enum.
*/

/// Fatal, return-value-level errors.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// A store-adapter call did not complete within its timeout budget.
    #[error("store operation timed out")]
    Timeout,

    /// A `setopt`/`getopt` call named an option that does not exist, or
    /// supplied a value of the wrong shape for it.
    #[error("invalid parameter: {0}")]
    ParmErr(&'static str),

    /// The channel handle does not refer to an open channel.
    #[error("invalid channel handle")]
    InvalidChannel,

    /// Every channel slot in the agent is already in use.
    #[error("all channel slots are in use")]
    ChannelsFull,

    /// The bundle or admin record uses a feature this core does not implement
    /// (status reports, legacy per-bundle custody signals, reassembly).
    #[error("unsupported bundle feature: {0}")]
    Unsupported(&'static str),

    /// The bundle should be silently dropped without further diagnostics
    /// (e.g. an admin-only channel received a non-admin bundle).
    #[error("bundle ignored")]
    Ignore,

    /// The bundle's lifetime has already elapsed.
    #[error("bundle lifetime expired")]
    Expired,

    /// The bundle's destination service does not match this channel's local endpoint.
    #[error("bundle is not addressed to this channel")]
    WrongChannel,

    /// The encoded bundle does not fit the caller's output buffer, or
    /// exceeds the channel's configured maximum bundle/fragment length.
    #[error("bundle exceeds the available buffer or configured maximum size")]
    BundleTooLarge,

    /// The caller's buffer is too small to receive the next queued payload.
    #[error("payload exceeds the caller's buffer")]
    PayloadTooLarge,

    /// The active table is saturated and the channel's wrap policy is "block".
    #[error("active custody table is full")]
    Overflow,

    /// The wire bytes did not parse as a well-formed bundle.
    #[error(transparent)]
    BundleParseErr(#[from] bp6_codec::error::Error),

    /// The store adapter reported a failure other than a timeout.
    #[error("store adapter failed: {0}")]
    FailedStore(String),

    /// The bundle was valid but deliberately not retained (e.g. an unknown
    /// block requested deletion-on-failure).
    #[error("bundle dropped")]
    Dropped,

    /// An administrative record type this core does not recognise (anything
    /// other than ACS).
    #[error("unrecognised administrative record type")]
    UnknownRec,
}

pub type Result<T> = core::result::Result<T, Error>;

macro_rules! flags {
    ($($(#[$meta:meta])* $name:ident = $bit:expr;)*) => {
        /// Advisory diagnostic flags, OR-ed together and returned to the
        /// caller alongside a successful (or non-fatal) `Result`.
        #[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
        pub struct Flags(pub u32);

        impl Flags {
            pub const NONE: Flags = Flags(0);
            $(
                $(#[$meta])*
                pub const $name: Flags = Flags(1 << $bit);
            )*

            pub fn set(&mut self, other: Flags) {
                self.0 |= other.0;
            }

            pub fn contains(&self, other: Flags) -> bool {
                self.0 & other.0 == other.0
            }

            pub fn is_empty(&self) -> bool {
                self.0 == 0
            }
        }

        impl core::ops::BitOr for Flags {
            type Output = Flags;
            fn bitor(self, rhs: Flags) -> Flags {
                Flags(self.0 | rhs.0)
            }
        }

        impl core::ops::BitOrAssign for Flags {
            fn bitor_assign(&mut self, rhs: Flags) {
                self.0 |= rhs.0;
            }
        }
    };
}

flags! {
    /// The bundle violated the protocol but was processed on a best-effort basis.
    NONCOMPLIANT = 0;
    /// An unrecognised block was skipped; the bundle may be missing features a peer intended.
    INCOMPLETE = 1;
    /// The bundle's "report deletion" flag was set and honoured.
    REPORT_DELETE = 2;
    /// The emitted bundle still needs a route decision (e.g. a DACS bundle).
    ROUTE_NEEDED = 3;
    /// A store-adapter operation failed; any affected active-table slot was vacated.
    STORE_FAIL = 4;
    /// A new custodian could not be accommodated; the ACS accumulator table is full.
    TOO_MANY_SOURCES = 5;
    /// An ACS accumulator's fill-run array is full.
    TOO_MANY_FILLS = 6;
    /// A gap between custody IDs exceeded the 14-bit fill-run limit.
    FILL_OVERFLOW = 7;
    /// An inbound CID was not greater than the last one accumulated for its custodian.
    CID_WENT_BACKWARDS = 8;
    /// A bundle could not be stored and was dropped as a result.
    UNABLE_TO_STORE = 9;
}
