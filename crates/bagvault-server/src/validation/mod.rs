//! Package validation
//!
//! Two independent validators run before any remote side effect:
//!
//! - [`checksum::ChecksumValidator`] verifies every manifest hash against
//!   on-disk content
//! - [`structure::StructureValidator`] verifies bag-level metadata rules,
//!   accumulating every violation before failing
//!
//! The descriptor schema check ([`descriptor`]) is independent of both and
//! reports a distinct error class, because an unavailable schema resource is
//! a configuration problem rather than a validation failure.

pub mod checksum;
pub mod descriptor;
pub mod structure;

pub use checksum::ChecksumValidator;
pub use descriptor::DescriptorValidator;
pub use structure::StructureValidator;
