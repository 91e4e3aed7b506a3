/*!
Block-level codec for an RFC 5050 compressed-CBHE bundle: the SDNV varint,
the Primary Block, the Custody Transfer Extension Block, the Bundle
Integrity Block, the Payload Block, and the ACS administrative record.

This crate has no notion of channels, queues, or custody policy — see the
`bp6-agent` crate for that. It only knows how to turn block structs into
bytes and back, and it never allocates a socket, a file, or a thread.
*/

pub mod acs;
pub mod bib;
pub mod block_flags;
pub mod block_type;
pub mod bundle_flags;
pub mod crc;
pub mod cteb;
pub mod eid;
pub mod error;
pub mod payload_block;
pub mod primary_block;
pub mod sdnv;
pub mod time;

pub use error::Error;
