use crate::buffer::{Buffer, InsufficientSpace};

/// Writer for a single outgoing frame.
///
/// [`begin`](Self::begin) reserves the five-byte header and records where it was written;
/// `put*` calls append the payload; [`finish`](Self::finish) backfills the big-endian length
/// once the payload size is known. Dropping a writer without calling `finish` leaves a partial
/// frame in the buffer, which the caller must treat as fatal for that stream.
pub(super) struct FrameWriter<'b> {
	buf: &'b mut Buffer,
	start: usize,
}

impl<'b> FrameWriter<'b> {
	pub(super) fn begin(buf: &'b mut Buffer, ident: u8) -> Result<Self, InsufficientSpace> {
		let start = buf.filled();
		let header = buf.get_free(5)?;
		header[4] = ident;
		Ok(Self { buf, start })
	}

	pub(super) fn put(&mut self, bytes: &[u8]) -> Result<(), InsufficientSpace> {
		self.buf.append(bytes)
	}

	pub(super) fn put_u16(&mut self, value: u16) -> Result<(), InsufficientSpace> {
		self.put(&value.to_be_bytes())
	}

	pub(super) fn put_u32(&mut self, value: u32) -> Result<(), InsufficientSpace> {
		self.put(&value.to_be_bytes())
	}

	/// Append a byte string followed by its NUL terminator.
	pub(super) fn put_cstr(&mut self, bytes: &[u8]) -> Result<(), InsufficientSpace> {
		self.put(bytes)?;
		self.put(&[0])
	}

	/// Backfill the length field. The length covers the identifier and payload, not itself.
	pub(super) fn finish(self) {
		let length = (self.buf.filled() - self.start - 4) as u32;
		self.buf.view_mut()[self.start..self.start + 4].copy_from_slice(&length.to_be_bytes());
	}
}
