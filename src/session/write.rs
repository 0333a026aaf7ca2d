use log::{trace, warn};

use super::{FilterProtocol, Phase};
use crate::buffer::Buffer;
use crate::error::{Error, Result};
use crate::messages::{ActionFlags, Message, Negotiate, ProtocolFlags};

impl FilterProtocol {
	/// Validate `message` against the session state and pack it into `buf`.
	///
	/// Verdicts are only legal while an event awaits a response; Skip additionally requires the
	/// negotiated SKIP capability and a Body event on the other end; modifications are only
	/// legal after EndOfMessage and only for negotiated action flags. A Negotiate reply settles
	/// the session's capability set.
	pub fn write_to(&mut self, buf: &mut Buffer, message: &Message<'_>) -> Result<()> {
		match message {
			Message::Negotiate(reply) => return self.write_negotiate(buf, reply),
			Message::Continue
			| Message::Reject
			| Message::Discard
			| Message::Accept
			| Message::TemporaryFailure
			| Message::Progress => {
				if self.awaiting.is_none() {
					return Err(Error::UnexpectedMessage("no event awaits a response"));
				}
				message.pack(buf)?;
				self.awaiting = None;
				// A verdict after EndOfMessage closes the transaction.
				if self.phase == Phase::PostEom {
					self.phase = Phase::Envelope;
				}
			},
			Message::Skip => {
				match self.awaiting {
					None => return Err(Error::UnexpectedMessage("no event awaits a response")),
					Some(b'B') => {
						if !self.skip() {
							return Err(Error::UnexpectedMessage("skip was not negotiated"));
						}
					},
					Some(_) => return Err(Error::InvalidMessage("skip only answers body events")),
				}
				message.pack(buf)?;
				self.awaiting = None;
			},
			Message::AddHeader(_)
			| Message::ChangeHeader(_)
			| Message::InsertHeader(_)
			| Message::ChangeSender(_)
			| Message::AddRecipient(_)
			| Message::AddRecipientPar(_)
			| Message::RemoveRecipient(_)
			| Message::ReplaceBody(_)
			| Message::Quarantine(_) => {
				if self.phase != Phase::PostEom {
					return Err(Error::UnexpectedMessage("modifications are only valid after end of message"));
				}
				if !self.action_allowed(message.ident()) {
					return Err(Error::UnexpectedMessage("modification was not negotiated"));
				}
				// Modifications do not consume the response slot; the transaction stays open
				// until a verdict follows.
				message.pack(buf)?;
			},
			_ => return Err(Error::InvalidMessage("message flows from MTA to filter")),
		}
		trace!("sent {:?}", message.ident() as char);
		Ok(())
	}

	/// Validate and pack a negotiation reply, then fix the session's capability set.
	fn write_negotiate(&mut self, buf: &mut Buffer, reply: &Negotiate) -> Result<()> {
		if self.phase != Phase::Negotiating || self.awaiting != Some(b'O') {
			return Err(Error::UnexpectedMessage("no negotiation offer awaits a reply"));
		}
		let mut action_bits = reply.action_flags;
		if !reply.macros.is_empty() && action_bits & ActionFlags::SETSYMLIST.bits() == 0 {
			warn!("symbol lists requested without SETSYMLIST, enabling it in the reply");
			action_bits |= ActionFlags::SETSYMLIST.bits();
		}
		if action_bits & !self.offered_actions != 0 {
			return Err(Error::Negotiation("action flags were not offered by the MTA"));
		}
		if reply.protocol_flags & !self.offered_protocol != 0 {
			return Err(Error::Negotiation("protocol flags were not offered by the MTA"));
		}
		let accepted = Negotiate {
			version: reply.version,
			action_flags: action_bits,
			protocol_flags: reply.protocol_flags,
			macros: reply.macros.clone(),
		};
		Message::Negotiate(accepted).pack(buf)?;
		self.version = reply.version;
		self.actions = ActionFlags::from_bits_truncate(action_bits);
		self.protocol = ProtocolFlags::from_bits_truncate(reply.protocol_flags);
		self.awaiting = None;
		self.phase = Phase::Connect;
		trace!("negotiated version {} actions {:?} protocol {:?}", self.version, self.actions, self.protocol);
		Ok(())
	}
}
