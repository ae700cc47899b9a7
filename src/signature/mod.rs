//! Signature engine: canonical XML, RSA-SHA256 signing and the signed `<Document>` envelope.

pub mod canonical;
pub mod envelope;
pub mod signer;

pub use canonical::{XmlElement, XmlNode, canonicalize};
pub use envelope::{Envelope, Header, build_signed_document};
pub use signer::{SigningContext, VerificationOutcome};
