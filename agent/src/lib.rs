/*!
`bp6-agent`: the custody-transfer channel engine for an RFC 5050 (Bundle
Protocol v6, compressed CBHE) agent. This crate turns the wire codec in
`bp6-codec` into something a host can actually run: per-channel outbound
queuing and fragmentation, active-custody-table retransmission, inbound
ACS (DACS) accumulation, and a small external store-adapter trait so
persistence is someone else's problem.

A [`Channel`](channel::Channel) owns one local/remote endpoint pair and all
the state that pair needs. An [`Agent`] owns a bounded set of channels and
dispatches handle-based calls to them — see its module docs for why the
bound exists and how handles are recycled.
*/

pub mod agent;
pub mod channel;
pub mod custody;
pub mod error;
pub mod options;
pub mod platform;
pub mod records;
pub mod store;

pub use agent::Agent;
pub use channel::{Channel, Opt, OptValue};
pub use error::{Error, Flags, Result};
pub use options::{Options, WrapPolicy};
pub use platform::{Clock, SystemClock};
pub use store::{Store, StoreHandle, StorageId};
