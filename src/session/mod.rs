//! Session state machine enforcing the legal ordering of events and responses.
//!
//! A [`FilterProtocol`] sits between two caller-owned [`Buffer`](crate::Buffer)s: the read side
//! drains decoded events from an input buffer one at a time, the write side validates each
//! outgoing response or modification against the negotiated capability set and current phase
//! before packing it into an output buffer. The machine owns no I/O and never blocks.

use crate::messages::{ActionFlags, Message, ProtocolFlags};

mod read;
mod write;

/// Lifecycle phase of a milter session.
///
/// Receive ordering after negotiation is deliberately loose, because an MTA omits stages freely
/// (`NO_*` flags, aborted and repeated transactions). The phase mainly gates the write side:
/// modifications are only legal in [`PostEom`](Phase::PostEom), and a final verdict there
/// returns the session to [`Envelope`](Phase::Envelope) for the next transaction.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
enum Phase {
	Negotiating,
	Connect,
	Helo,
	Envelope,
	Headers,
	Body,
	PostEom,
	Closed,
}

/// Modification identifiers unlocked by each action flag.
const ACTION_IDENTS: &[(ActionFlags, &[u8])] = &[
	(ActionFlags::ADD_HEADERS, b"h"),
	(ActionFlags::CHANGE_BODY, b"b"),
	(ActionFlags::ADD_RCPT, b"+"),
	(ActionFlags::DEL_RCPT, b"-"),
	(ActionFlags::CHANGE_HEADERS, b"mi"),
	(ActionFlags::QUARANTINE, b"q"),
	(ActionFlags::CHANGE_FROM, b"e"),
	(ActionFlags::ADD_RCPT_PAR, b"2"),
];

/// Event identifiers silenced by each no-reply flag.
const NR_IDENTS: &[(ProtocolFlags, u8)] = &[
	(ProtocolFlags::NR_CONNECT, b'C'),
	(ProtocolFlags::NR_HELO, b'H'),
	(ProtocolFlags::NR_SENDER, b'M'),
	(ProtocolFlags::NR_RECIPIENT, b'R'),
	(ProtocolFlags::NR_DATA, b'T'),
	(ProtocolFlags::NR_UNKNOWN, b'U'),
	(ProtocolFlags::NR_HEADER, b'L'),
	(ProtocolFlags::NR_END_OF_HEADERS, b'N'),
	(ProtocolFlags::NR_BODY, b'B'),
];

/// State machine for one filter session.
///
/// Create one per MTA connection, feed received bytes through
/// [`read_from`](Self::read_from) and answer each event through
/// [`write_to`](Self::write_to). After a sequencing error the session is unusable and the
/// transport should be closed.
#[derive(Debug)]
pub struct FilterProtocol {
	abort_on_unknown: bool,
	phase: Phase,
	/// Protocol version announced by the MTA, then the version agreed in the reply.
	version: u32,
	/// Raw flag words from the MTA's offer.
	offered_actions: u32,
	offered_protocol: u32,
	/// Capabilities accepted during negotiation.
	actions: ActionFlags,
	protocol: ProtocolFlags,
	/// Identifier of the event currently owed a response.
	awaiting: Option<u8>,
	/// Frame bytes yielded by the last read, consumed on the next one.
	pending_consume: usize,
}

impl FilterProtocol {
	/// Create a session that surfaces unknown messages as errors.
	pub fn new() -> Self {
		Self::with_abort_on_unknown(false)
	}

	/// Create a session, choosing how unknown messages are handled: when `abort_on_unknown` is
	/// set they are swallowed and surfaced as synthesized [`Abort`](Message::Abort) events.
	pub fn with_abort_on_unknown(abort_on_unknown: bool) -> Self {
		Self {
			abort_on_unknown,
			phase: Phase::Negotiating,
			version: 0,
			offered_actions: 0,
			offered_protocol: 0,
			actions: ActionFlags::empty(),
			protocol: ProtocolFlags::empty(),
			awaiting: None,
			pending_consume: 0,
		}
	}

	/// The protocol version in effect, as announced by the MTA and confirmed in the reply.
	pub fn version(&self) -> u32 {
		self.version
	}

	/// Whether this message expects a response from the filter, given the negotiated flags.
	///
	/// Negotiate and EndOfMessage always do; Macro, Abort and Close never do; every other event
	/// does unless its `NR_*` flag was negotiated. Outbound kinds never expect one.
	pub fn needs_response(&self, message: &Message<'_>) -> bool {
		match message {
			Message::Negotiate(_) | Message::EndOfMessage(_) => true,
			Message::Macro(_) | Message::Abort | Message::Close => false,
			Message::Connect(_)
			| Message::Helo(_)
			| Message::EnvelopeFrom(_)
			| Message::EnvelopeRecipient(_)
			| Message::Data
			| Message::Unknown(_)
			| Message::Header(_)
			| Message::EndOfHeaders
			| Message::Body(_) => !self.nr().contains(&message.ident()),
			_ => false,
		}
	}

	/// Whether the SKIP capability was negotiated.
	pub fn skip(&self) -> bool {
		self.protocol.contains(ProtocolFlags::SKIP)
	}

	/// Identifiers of the modification messages the filter may emit after EndOfMessage.
	pub fn actions(&self) -> Vec<u8> {
		ACTION_IDENTS
			.iter()
			.filter(|(flag, _)| self.actions.contains(*flag))
			.flat_map(|(_, idents)| idents.iter().copied())
			.collect()
	}

	/// Identifiers of the events for which no reply was negotiated.
	pub fn nr(&self) -> Vec<u8> {
		NR_IDENTS
			.iter()
			.filter(|(flag, _)| self.protocol.contains(*flag))
			.map(|&(_, ident)| ident)
			.collect()
	}

	fn action_allowed(&self, ident: u8) -> bool {
		ACTION_IDENTS
			.iter()
			.any(|(flag, idents)| idents.contains(&ident) && self.actions.contains(*flag))
	}
}

impl Default for FilterProtocol {
	fn default() -> Self {
		Self::new()
	}
}
