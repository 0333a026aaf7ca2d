//! Sans-I/O implementation of the Sendmail milter protocol, versions 2 through 6.
//!
//! An MTA streams an in-flight mail transaction to a filter as a sequence of framed events and
//! expects a verdict for most of them; after the end of the message the filter may also send
//! modifications. This crate provides the three pieces that sit between a transport and a
//! filter implementation, without owning any I/O:
//!
//! - [`Buffer`], a fixed-capacity byte buffer with zero-copy views over received bytes
//! - [`Message`] and its codec, packing and unpacking every message kind of the protocol
//! - [`FilterProtocol`], the per-session state machine validating event and response ordering
//!   against the negotiated capability set
//!
//! The caller appends received bytes to a buffer and drains events with
//! [`FilterProtocol::read_from`]; each response or modification goes through
//! [`FilterProtocol::write_to`] into an output buffer the caller then transmits and consumes.
//! Notices that are not errors (for example an implicit SETSYMLIST elevation) are emitted
//! through the [`log`] facade.

pub mod buffer;
pub mod error;
pub mod messages;
pub mod session;

pub use self::buffer::Buffer;
pub use self::error::{Error, Result};
pub use self::messages::Message;
pub use self::session::FilterProtocol;
