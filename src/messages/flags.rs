use bitflags::bitflags;

bitflags! {
	/// Modification capabilities, advertised by the MTA in its negotiation offer and selected by
	/// the filter in its reply.
	///
	/// Each post-EOM modification message requires the matching flag to have been negotiated.
	pub struct ActionFlags: u32 {
		const ADD_HEADERS = 0x001;
		const CHANGE_BODY = 0x002;
		const ADD_RCPT = 0x004;
		const DEL_RCPT = 0x008;
		const CHANGE_HEADERS = 0x010;
		const QUARANTINE = 0x020;
		const CHANGE_FROM = 0x040;
		const ADD_RCPT_PAR = 0x080;
		const SETSYMLIST = 0x100;
	}
}

bitflags! {
	/// Protocol-level options negotiated alongside [`ActionFlags`].
	///
	/// `NO_*` asks the MTA not to send a stage at all, `NR_*` declares that the filter will not
	/// reply to it. `SKIP` permits short-circuiting further body chunks, and the
	/// `MAX_DATA_SIZE_*` flags select the largest frame the filter accepts.
	pub struct ProtocolFlags: u32 {
		const NO_CONNECT = 0x00_0001;
		const NO_HELO = 0x00_0002;
		const NO_SENDER = 0x00_0004;
		const NO_RECIPIENT = 0x00_0008;
		const NO_BODY = 0x00_0010;
		const NO_HEADERS = 0x00_0020;
		const NO_END_OF_HEADERS = 0x00_0040;
		const NR_HEADER = 0x00_0080;
		const NO_UNKNOWN = 0x00_0100;
		const NO_DATA = 0x00_0200;
		const SKIP = 0x00_0400;
		const REJECTED_RECIPIENT = 0x00_0800;
		const NR_CONNECT = 0x00_1000;
		const NR_HELO = 0x00_2000;
		const NR_SENDER = 0x00_4000;
		const NR_RECIPIENT = 0x00_8000;
		const NR_DATA = 0x01_0000;
		const NR_UNKNOWN = 0x02_0000;
		const NR_END_OF_HEADERS = 0x04_0000;
		const NR_BODY = 0x08_0000;
		const HEADER_LEADING_SPACE = 0x10_0000;
		const MAX_DATA_SIZE_256K = 0x1000_0000;
		const MAX_DATA_SIZE_1M = 0x2000_0000;
		const MAX_DATA_SIZE_1G = 0x4000_0000;
	}
}

/// Mail transaction stages used to key per-stage macro (symbol) lists.
#[repr(u32)]
#[derive(Copy, Clone, Debug, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub enum Stage {
	Connect = 0,
	Helo = 1,
	EnvelopeFrom = 2,
	EnvelopeRecipient = 3,
	Data = 4,
	EndOfMessage = 5,
	EndOfHeaders = 6,
}

impl Stage {
	/// Decode a stage from its wire value.
	pub fn from_wire(value: u32) -> Option<Self> {
		match value {
			0 => Some(Self::Connect),
			1 => Some(Self::Helo),
			2 => Some(Self::EnvelopeFrom),
			3 => Some(Self::EnvelopeRecipient),
			4 => Some(Self::Data),
			5 => Some(Self::EndOfMessage),
			6 => Some(Self::EndOfHeaders),
			_ => None,
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn action_flags_pack_into_the_documented_bits() {
		let flags = ActionFlags::ADD_HEADERS | ActionFlags::CHANGE_BODY | ActionFlags::QUARANTINE;

		assert_eq!(flags.bits(), 0x23);
	}

	#[test]
	fn action_flags_unpack_from_a_bitfield_word() {
		let flags = ActionFlags::from_bits_truncate(0x23);

		assert_eq!(flags, ActionFlags::ADD_HEADERS | ActionFlags::CHANGE_BODY | ActionFlags::QUARANTINE);
	}

	#[test]
	fn all_action_flags_cover_the_full_v6_set() {
		assert_eq!(ActionFlags::all().bits(), 0x1ff);
	}

	#[test]
	fn negotiation_flags_cover_the_no_reply_range() {
		assert_eq!(ProtocolFlags::from_bits_truncate(0xf_ffff).bits(), 0xf_ffff);
	}

	#[test]
	fn stages_round_trip_their_wire_values() {
		for stage in [
			Stage::Connect,
			Stage::Helo,
			Stage::EnvelopeFrom,
			Stage::EnvelopeRecipient,
			Stage::Data,
			Stage::EndOfMessage,
			Stage::EndOfHeaders,
		] {
			assert_eq!(Stage::from_wire(stage as u32), Some(stage));
		}
		assert_eq!(Stage::from_wire(7), None);
	}
}
