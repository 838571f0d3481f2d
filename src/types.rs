//! Core identifier types shared across the crate.

/// TreeId: identifier of one replicated vertex tree inside a space
pub type TreeId = String;

/// OriginId: identifier of the process/peer that produced an operation
pub type OriginId = String;

/// SpaceId: identifier of a space, as recorded in its manifest
pub type SpaceId = String;
