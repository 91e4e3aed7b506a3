/*!
Endpoint identifiers. RFC 5050 compressed-CBHE form names every endpoint as an
`ipn:node.service` pair of unsigned integers rather than a general URI; this
codec only ever deals with that compressed form (dictionary length is always
zero — see [`crate::primary_block`]).
*/

/// An IPN-style endpoint identifier: `ipn:node.service`.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Eid {
    pub node: u64,
    pub service: u64,
}

impl Eid {
    pub const NULL: Eid = Eid { node: 0, service: 0 };

    pub const fn new(node: u64, service: u64) -> Self {
        Self { node, service }
    }
}

impl core::fmt::Display for Eid {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "ipn:{}.{}", self.node, self.service)
    }
}
