use thiserror::Error;

use crate::buffer::InsufficientSpace;

/// Result alias for codec and session operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by the codec and the session state machine.
///
/// Each variant is a distinct failure class a caller may want to handle differently: incomplete
/// input, an unrecognised frame, a malformed or misdirected message, a sequencing violation, a
/// full buffer, and a rejected negotiation request.
#[derive(Debug, Error)]
pub enum Error {
	/// The buffer does not yet hold a complete frame.
	///
	/// [`FilterProtocol::read_from`](crate::FilterProtocol::read_from) absorbs this internally
	/// and reports end-of-sequence instead; it only reaches callers that drive
	/// [`Message::unpack`](crate::Message::unpack) directly.
	#[error("frame is incomplete, more bytes are needed")]
	NeedsMore,

	/// A well-framed message whose identifier is not in the known table.
	///
	/// `contents` holds the entire frame, length prefix included, so the caller can log it or
	/// reflect it back to the MTA.
	#[error("unknown message identifier {:?}", ident_of(contents))]
	UnknownMessage { contents: Vec<u8> },

	/// A known message whose payload is malformed, or a message whose kind is illegal at the
	/// current point of the session in either direction.
	#[error("invalid message: {0}")]
	InvalidMessage(&'static str),

	/// A sequencing violation, such as reading a new event before responding to the previous
	/// one or writing a modification that was not negotiated.
	#[error("unexpected message: {0}")]
	UnexpectedMessage(&'static str),

	/// A buffer could not accept a write.
	#[error(transparent)]
	InsufficientSpace(#[from] InsufficientSpace),

	/// A negotiation reply requested capabilities the MTA did not offer.
	#[error("negotiation rejected: {0}")]
	Negotiation(&'static str),
}

fn ident_of(contents: &[u8]) -> char {
	contents.get(4).copied().unwrap_or(b'?') as char
}
