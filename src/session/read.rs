use std::mem;

use log::{trace, warn};

use super::{FilterProtocol, Phase};
use crate::buffer::Buffer;
use crate::error::{Error, Result};
use crate::messages::Message;

impl FilterProtocol {
	/// Yield the next decoded event from `buf`, or `None` when no complete frame remains.
	///
	/// This is a lazy sequence driven by repeated calls: each event borrows the buffer and its
	/// frame is consumed on the following call, so abandoning the sequence leaves unread frames
	/// (and the last yielded frame) intact. The caller must answer any event for which
	/// [`needs_response`](Self::needs_response) holds before reading further, or the next call
	/// reports [`Error::UnexpectedMessage`].
	pub fn read_from<'b>(&mut self, buf: &'b mut Buffer) -> Option<Result<Message<'b>>> {
		if self.pending_consume > 0 {
			buf.consume(mem::take(&mut self.pending_consume));
		}
		let (message, size) = match Message::unpack(&*buf) {
			Ok(decoded) => decoded,
			Err(Error::NeedsMore) => return None,
			Err(Error::UnknownMessage { contents }) => {
				self.pending_consume = contents.len();
				if self.abort_on_unknown {
					trace!("treating unknown message {:?} as an abort", contents);
					self.note_event(&Message::Abort);
					return Some(Ok(Message::Abort));
				}
				warn!("received unknown message {:?}", contents);
				return Some(Err(Error::UnknownMessage { contents }));
			},
			Err(err) => return Some(Err(err)),
		};
		if self.awaiting.is_some() {
			return Some(Err(Error::UnexpectedMessage("previous event still awaits a response")));
		}
		if let Err(err) = self.check_receivable(&message) {
			return Some(Err(err));
		}
		trace!("received {:?} ({size} bytes)", message.ident() as char);
		self.note_event(&message);
		self.pending_consume = size;
		Some(Ok(message))
	}

	/// Check that `message` may be received at all in the current phase.
	fn check_receivable(&self, message: &Message<'_>) -> Result<()> {
		let is_event = matches!(
			message,
			Message::Negotiate(_)
				| Message::Macro(_)
				| Message::Connect(_)
				| Message::Helo(_)
				| Message::EnvelopeFrom(_)
				| Message::EnvelopeRecipient(_)
				| Message::Data
				| Message::Unknown(_)
				| Message::Header(_)
				| Message::EndOfHeaders
				| Message::Body(_)
				| Message::EndOfMessage(_)
				| Message::Abort
				| Message::Close
		);
		if !is_event {
			return Err(Error::InvalidMessage("message flows from filter to MTA"));
		}
		match self.phase {
			Phase::Negotiating => match message {
				Message::Negotiate(_) => Ok(()),
				_ => Err(Error::UnexpectedMessage("session has not negotiated yet")),
			},
			Phase::Closed => Err(Error::UnexpectedMessage("session is closed")),
			_ => match message {
				Message::Negotiate(_) => Err(Error::UnexpectedMessage("negotiation already completed")),
				_ => Ok(()),
			},
		}
	}

	/// Record an accepted event: remember the MTA's offer, advance the phase, and mark whether a
	/// response is owed.
	fn note_event(&mut self, message: &Message<'_>) {
		match message {
			Message::Negotiate(offer) => {
				self.version = offer.version;
				self.offered_actions = offer.action_flags;
				self.offered_protocol = offer.protocol_flags;
			},
			Message::Connect(_) => self.phase = Phase::Helo,
			Message::Helo(_) | Message::EnvelopeFrom(_) | Message::EnvelopeRecipient(_) => {
				self.phase = Phase::Envelope;
			},
			Message::Data | Message::Header(_) => self.phase = Phase::Headers,
			Message::EndOfHeaders | Message::Body(_) => self.phase = Phase::Body,
			Message::EndOfMessage(_) => self.phase = Phase::PostEom,
			Message::Abort => self.phase = Phase::Envelope,
			Message::Close => self.phase = Phase::Closed,
			_ => {},
		}
		self.awaiting = if self.needs_response(message) { Some(message.ident()) } else { None };
	}
}
