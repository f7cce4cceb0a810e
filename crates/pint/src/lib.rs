#![allow(clippy::result_large_err)]
//! quayside-pint: the platform interoperability (PINT) standard for
//! transferring electronic bills of lading between eBL platforms.
//!
//! A transfer is an envelope carrying the transport document, a
//! hash-chained list of signed transfer chain entries and a signed manifest
//! committing to the chain and to any additional documents. The sending
//! platform posts the envelope, uploads the documents the receiver reports
//! missing, then finishes the transfer; the receiver answers with signed
//! response codes.
//!
//! [`PintComponentFactory`] plugs the standard into a sandbox.

pub mod actions;
pub mod checks;
pub mod crypto;
pub mod envelope;
mod factory;
pub mod model;
pub mod parties;
pub mod scenarios;
pub mod schemas;

pub use factory::PintComponentFactory;
pub use model::{PintContext, RECEIVING_PLATFORM, SENDING_PLATFORM, STANDARD_NAME, STANDARD_VERSION};
pub use parties::{PintReceivingPlatform, PintSendingPlatform};
