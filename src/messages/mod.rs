//! Typed milter messages and the codec that frames them.
//!
//! Every message travels as `length: u32 BE` + `identifier: u8` + `payload`, where the length
//! covers the identifier and payload but not itself. [`Message::unpack`] decodes one frame from
//! a [`Buffer`], borrowing blob and text fields in place; [`Message::pack`] appends a frame to a
//! buffer, backfilling the length once the payload is written.

use std::net::{Ipv4Addr, Ipv6Addr};
use std::path::PathBuf;

use crate::buffer::Buffer;
use crate::error::{Error, Result};

use self::decode::Payload;
use self::encode::FrameWriter;

mod decode;
mod encode;
mod flags;

pub use self::flags::{ActionFlags, ProtocolFlags, Stage};

/// Peer address carried by a [`Connect`] event.
///
/// The wire family letters are `U` (address unknown, no address bytes at all), `L` (local
/// socket, port bytes then a path), `4` and `6` (port bytes then the textual address).
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ConnectAddr {
	None,
	Unix(PathBuf),
	Ip4(Ipv4Addr),
	Ip6(Ipv6Addr),
}

/// Capability offer (MTA to filter) or selection (filter to MTA).
///
/// The flag words are kept as raw `u32` so bits outside the known sets survive a round trip;
/// the session layer applies [`ActionFlags`] and [`ProtocolFlags`] once negotiation settles.
/// `macros` maps stages to the symbol lists the filter wants announced; wire order follows the
/// order of the entries.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Negotiate {
	pub version: u32,
	pub action_flags: u32,
	pub protocol_flags: u32,
	pub macros: Vec<(Stage, Vec<String>)>,
}

impl Negotiate {
	/// Convenience constructor for a reply with typed flags and no symbol lists.
	pub fn new(version: u32, actions: ActionFlags, protocol: ProtocolFlags) -> Self {
		Self {
			version,
			action_flags: actions.bits(),
			protocol_flags: protocol.bits(),
			macros: Vec::new(),
		}
	}
}

/// Macro (symbol) values for one stage, keyed by the stage's command character.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Macro<'a> {
	pub stage: u8,
	pub macros: Vec<(&'a str, &'a str)>,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Connect {
	/// Client hostname, IDNA-decoded. Encoded back to its ASCII form on the wire.
	pub hostname: String,
	pub address: ConnectAddr,
	pub port: u16,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Helo {
	pub hostname: String,
}

/// `MAIL FROM` event. The sender and any ESMTP arguments are raw mailbox bytes.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct EnvelopeFrom<'a> {
	pub sender: &'a [u8],
	pub arguments: Vec<&'a [u8]>,
}

/// `RCPT TO` event, one per recipient.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct EnvelopeRecipient<'a> {
	pub recipient: &'a [u8],
	pub arguments: Vec<&'a [u8]>,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Header<'a> {
	pub name: &'a str,
	pub value: &'a [u8],
}

/// Post-EOM request to append a header.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct AddHeader<'a> {
	pub name: &'a str,
	pub value: &'a [u8],
}

/// Post-EOM request to replace the `index`-th occurrence of header `name`.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ChangeHeader<'a> {
	pub index: u32,
	pub name: &'a str,
	pub value: &'a [u8],
}

/// Post-EOM request to insert a header at position `index`.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct InsertHeader<'a> {
	pub index: u32,
	pub name: &'a str,
	pub value: &'a [u8],
}

/// Post-EOM request to replace the envelope sender, with optional ESMTP arguments.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ChangeSender<'a> {
	pub address: &'a str,
	pub args: Option<&'a str>,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct AddRecipient<'a> {
	pub address: &'a str,
}

/// Like [`AddRecipient`] but allowing ESMTP arguments alongside the address.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct AddRecipientPar<'a> {
	pub address: &'a str,
	pub args: Option<&'a str>,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RemoveRecipient<'a> {
	pub address: &'a str,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Quarantine<'a> {
	pub reason: &'a str,
}

/// One milter message of any kind, in either direction.
///
/// Variants carrying blob or text payloads borrow from the buffer they were decoded from, so a
/// decoded message must be dropped before the buffer can consume its frame. Empty messages are
/// unit variants.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Message<'a> {
	// Events, MTA to filter.
	Negotiate(Negotiate),
	Macro(Macro<'a>),
	Connect(Connect),
	Helo(Helo),
	EnvelopeFrom(EnvelopeFrom<'a>),
	EnvelopeRecipient(EnvelopeRecipient<'a>),
	Data,
	Unknown(&'a [u8]),
	Header(Header<'a>),
	EndOfHeaders,
	Body(&'a [u8]),
	EndOfMessage(&'a [u8]),
	Abort,
	Close,
	// Verdicts, filter to MTA.
	Continue,
	Reject,
	Discard,
	Accept,
	TemporaryFailure,
	Progress,
	Skip,
	// Post-EOM modifications, filter to MTA.
	AddHeader(AddHeader<'a>),
	ChangeHeader(ChangeHeader<'a>),
	InsertHeader(InsertHeader<'a>),
	ChangeSender(ChangeSender<'a>),
	AddRecipient(AddRecipient<'a>),
	AddRecipientPar(AddRecipientPar<'a>),
	RemoveRecipient(RemoveRecipient<'a>),
	ReplaceBody(&'a [u8]),
	Quarantine(Quarantine<'a>),
}

impl<'a> Message<'a> {
	/// The identifier byte selecting this message's kind on the wire.
	pub fn ident(&self) -> u8 {
		match self {
			Self::Negotiate(_) => b'O',
			Self::Macro(_) => b'D',
			Self::Connect(_) => b'C',
			Self::Helo(_) => b'H',
			Self::EnvelopeFrom(_) => b'M',
			Self::EnvelopeRecipient(_) => b'R',
			Self::Data => b'T',
			Self::Unknown(_) => b'U',
			Self::Header(_) => b'L',
			Self::EndOfHeaders => b'N',
			Self::Body(_) => b'B',
			Self::EndOfMessage(_) => b'E',
			Self::Abort => b'A',
			Self::Close => b'Q',
			Self::Continue => b'c',
			Self::Reject => b'r',
			Self::Discard => b'd',
			Self::Accept => b'a',
			Self::TemporaryFailure => b't',
			Self::Progress => b'p',
			Self::Skip => b's',
			Self::AddHeader(_) => b'h',
			Self::ChangeHeader(_) => b'm',
			Self::InsertHeader(_) => b'i',
			Self::ChangeSender(_) => b'e',
			Self::AddRecipient(_) => b'+',
			Self::AddRecipientPar(_) => b'2',
			Self::RemoveRecipient(_) => b'-',
			Self::ReplaceBody(_) => b'b',
			Self::Quarantine(_) => b'q',
		}
	}

	/// Decode one frame from the head of `buf`.
	///
	/// Returns the message and the number of bytes its frame occupies; the caller consumes that
	/// many bytes once it has finished with the message. [`Error::NeedsMore`] means the frame is
	/// not complete yet and nothing was decoded.
	pub fn unpack(buf: &'a Buffer) -> Result<(Self, usize)> {
		let view = buf.view();
		if view.len() < 4 {
			return Err(Error::NeedsMore);
		}
		let length = u32::from_be_bytes([view[0], view[1], view[2], view[3]]) as usize;
		if length == 0 {
			return Err(Error::InvalidMessage("frame length must cover the identifier"));
		}
		if view.len() < 4 + length {
			return Err(Error::NeedsMore);
		}
		let frame = &view[..4 + length];
		let mut payload = Payload::new(&frame[5..]);
		let message = match frame[4] {
			b'O' => Self::Negotiate(unpack_negotiate(&mut payload)?),
			b'D' => Self::Macro(unpack_macro(&mut payload)?),
			b'C' => Self::Connect(unpack_connect(&mut payload)?),
			b'H' => Self::Helo(Helo { hostname: host_from_wire(payload.take_cstr()?)? }),
			b'M' => {
				let sender = payload.take_cstr()?;
				Self::EnvelopeFrom(EnvelopeFrom { sender, arguments: unpack_arguments(&mut payload)? })
			},
			b'R' => {
				let recipient = payload.take_cstr()?;
				Self::EnvelopeRecipient(EnvelopeRecipient { recipient, arguments: unpack_arguments(&mut payload)? })
			},
			b'T' => Self::Data,
			b'U' => Self::Unknown(payload.take_rest()),
			b'L' => {
				let name = payload.take_str()?;
				Self::Header(Header { name, value: payload.take_cstr()? })
			},
			b'N' => Self::EndOfHeaders,
			b'B' => Self::Body(payload.take_rest()),
			b'E' => Self::EndOfMessage(payload.take_rest()),
			b'A' => Self::Abort,
			b'Q' => Self::Close,
			b'c' => Self::Continue,
			b'r' => Self::Reject,
			b'd' => Self::Discard,
			b'a' => Self::Accept,
			b't' => Self::TemporaryFailure,
			b'p' => Self::Progress,
			b's' => Self::Skip,
			b'h' => {
				let name = payload.take_str()?;
				Self::AddHeader(AddHeader { name, value: payload.take_cstr()? })
			},
			b'm' => {
				let index = payload.take_u32()?;
				let name = payload.take_str()?;
				Self::ChangeHeader(ChangeHeader { index, name, value: payload.take_cstr()? })
			},
			b'i' => {
				let index = payload.take_u32()?;
				let name = payload.take_str()?;
				Self::InsertHeader(InsertHeader { index, name, value: payload.take_cstr()? })
			},
			b'e' => {
				let address = payload.take_str()?;
				Self::ChangeSender(ChangeSender { address, args: unpack_optional_str(&mut payload)? })
			},
			b'+' => Self::AddRecipient(AddRecipient { address: payload.take_str()? }),
			b'2' => {
				let address = payload.take_str()?;
				Self::AddRecipientPar(AddRecipientPar { address, args: unpack_optional_str(&mut payload)? })
			},
			b'-' => Self::RemoveRecipient(RemoveRecipient { address: payload.take_str()? }),
			b'b' => Self::ReplaceBody(payload.take_rest()),
			b'q' => Self::Quarantine(Quarantine { reason: payload.take_str()? }),
			_ => return Err(Error::UnknownMessage { contents: frame.to_vec() }),
		};
		payload.finish()?;
		Ok((message, 4 + length))
	}

	/// Append this message's frame to `buf`.
	///
	/// On [`InsufficientSpace`](crate::buffer::InsufficientSpace) the buffer may hold a partial
	/// frame; the stream it backs must be abandoned.
	pub fn pack(&self, buf: &mut Buffer) -> Result<()> {
		let mut frame = FrameWriter::begin(buf, self.ident())?;
		match self {
			Self::Negotiate(body) => {
				frame.put_u32(body.version)?;
				frame.put_u32(body.action_flags)?;
				frame.put_u32(body.protocol_flags)?;
				for (stage, symbols) in &body.macros {
					frame.put_u32(*stage as u32)?;
					frame.put_cstr(symbols.join(" ").as_bytes())?;
				}
			},
			Self::Macro(body) => {
				frame.put(&[body.stage])?;
				for (name, value) in &body.macros {
					frame.put_cstr(name.as_bytes())?;
					frame.put_cstr(value.as_bytes())?;
				}
			},
			Self::Connect(body) => pack_connect(&mut frame, body)?,
			Self::Helo(body) => frame.put_cstr(host_to_wire(&body.hostname)?.as_bytes())?,
			Self::EnvelopeFrom(body) => {
				frame.put_cstr(body.sender)?;
				for argument in &body.arguments {
					frame.put_cstr(argument)?;
				}
			},
			Self::EnvelopeRecipient(body) => {
				frame.put_cstr(body.recipient)?;
				for argument in &body.arguments {
					frame.put_cstr(argument)?;
				}
			},
			Self::Unknown(content) | Self::Body(content) | Self::EndOfMessage(content) | Self::ReplaceBody(content) => {
				frame.put(content)?;
			},
			Self::Header(Header { name, value }) | Self::AddHeader(AddHeader { name, value }) => {
				frame.put_cstr(name.as_bytes())?;
				frame.put_cstr(value)?;
			},
			Self::ChangeHeader(ChangeHeader { index, name, value })
			| Self::InsertHeader(InsertHeader { index, name, value }) => {
				frame.put_u32(*index)?;
				frame.put_cstr(name.as_bytes())?;
				frame.put_cstr(value)?;
			},
			Self::ChangeSender(ChangeSender { address, args })
			| Self::AddRecipientPar(AddRecipientPar { address, args }) => {
				frame.put_cstr(address.as_bytes())?;
				if let Some(args) = args {
					frame.put_cstr(args.as_bytes())?;
				}
			},
			Self::AddRecipient(AddRecipient { address }) | Self::RemoveRecipient(RemoveRecipient { address }) => {
				frame.put_cstr(address.as_bytes())?;
			},
			Self::Quarantine(body) => frame.put_cstr(body.reason.as_bytes())?,
			Self::Data
			| Self::EndOfHeaders
			| Self::Abort
			| Self::Close
			| Self::Continue
			| Self::Reject
			| Self::Discard
			| Self::Accept
			| Self::TemporaryFailure
			| Self::Progress
			| Self::Skip => {},
		}
		frame.finish();
		Ok(())
	}
}

fn unpack_negotiate(payload: &mut Payload<'_>) -> Result<Negotiate> {
	let version = payload.take_u32()?;
	let action_flags = payload.take_u32()?;
	let protocol_flags = payload.take_u32()?;
	let mut macros = Vec::new();
	while !payload.is_empty() {
		let stage = Stage::from_wire(payload.take_u32()?).ok_or(Error::InvalidMessage("unknown macro stage"))?;
		let symbols = payload.take_str()?;
		macros.push((stage, symbols.split(' ').filter(|s| !s.is_empty()).map(str::to_owned).collect()));
	}
	Ok(Negotiate { version, action_flags, protocol_flags, macros })
}

fn unpack_macro<'a>(payload: &mut Payload<'a>) -> Result<Macro<'a>> {
	let stage = payload.take_u8()?;
	let mut macros = Vec::new();
	while !payload.is_empty() {
		let name = payload.take_str()?;
		let value = payload.take_str()?;
		macros.push((name, value));
	}
	Ok(Macro { stage, macros })
}

fn unpack_connect(payload: &mut Payload<'_>) -> Result<Connect> {
	let hostname = host_from_wire(payload.take_cstr()?)?;
	let (address, port) = match payload.take_u8()? {
		b'U' => (ConnectAddr::None, 0),
		b'L' => {
			let port = payload.take_u16()?;
			(ConnectAddr::Unix(PathBuf::from(payload.take_str()?)), port)
		},
		b'4' => {
			let port = payload.take_u16()?;
			let address =
				payload.take_str()?.parse().map_err(|_| Error::InvalidMessage("malformed IPv4 address"))?;
			(ConnectAddr::Ip4(address), port)
		},
		b'6' => {
			let port = payload.take_u16()?;
			let address =
				payload.take_str()?.parse().map_err(|_| Error::InvalidMessage("malformed IPv6 address"))?;
			(ConnectAddr::Ip6(address), port)
		},
		_ => return Err(Error::InvalidMessage("unknown connect address family")),
	};
	Ok(Connect { hostname, address, port })
}

fn unpack_arguments<'a>(payload: &mut Payload<'a>) -> Result<Vec<&'a [u8]>> {
	let mut arguments = Vec::new();
	while !payload.is_empty() {
		arguments.push(payload.take_cstr()?);
	}
	Ok(arguments)
}

fn unpack_optional_str<'a>(payload: &mut Payload<'a>) -> Result<Option<&'a str>> {
	if payload.is_empty() {
		Ok(None)
	} else {
		payload.take_str().map(Some)
	}
}

fn pack_connect(frame: &mut FrameWriter<'_>, body: &Connect) -> Result<()> {
	frame.put_cstr(host_to_wire(&body.hostname)?.as_bytes())?;
	match &body.address {
		ConnectAddr::None => frame.put(&[b'U'])?,
		ConnectAddr::Unix(path) => {
			let path = path.to_str().ok_or(Error::InvalidMessage("socket path is not valid UTF-8"))?;
			frame.put(&[b'L'])?;
			frame.put_u16(body.port)?;
			frame.put_cstr(path.as_bytes())?;
		},
		ConnectAddr::Ip4(address) => {
			frame.put(&[b'4'])?;
			frame.put_u16(body.port)?;
			frame.put_cstr(address.to_string().as_bytes())?;
		},
		ConnectAddr::Ip6(address) => {
			frame.put(&[b'6'])?;
			frame.put_u16(body.port)?;
			frame.put_cstr(address.to_string().as_bytes())?;
		},
	}
	Ok(())
}

/// Decode a wire hostname into its Unicode form.
fn host_from_wire(bytes: &[u8]) -> Result<String> {
	let ascii = std::str::from_utf8(bytes).map_err(|_| Error::InvalidMessage("hostname is not valid UTF-8"))?;
	let (hostname, outcome) = idna::domain_to_unicode(ascii);
	outcome.map_err(|_| Error::InvalidMessage("hostname is not valid IDNA"))?;
	Ok(hostname)
}

/// Encode a hostname into its ASCII-compatible wire form.
fn host_to_wire(hostname: &str) -> Result<String> {
	idna::domain_to_ascii(hostname).map_err(|_| Error::InvalidMessage("hostname cannot be IDNA encoded"))
}
