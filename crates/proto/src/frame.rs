//! Length-delimited frames and frame body grammars.

use std::io::{Error as IoError, ErrorKind};

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Upper bound on a single frame body.
pub const MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

/// Reads one length-prefixed frame body.
pub async fn read_frame(input: &mut (impl AsyncRead + Unpin)) -> std::io::Result<Vec<u8>> {
	let mut len_bytes = [0u8; 4];
	input.read_exact(&mut len_bytes).await?;
	let len = u32::from_le_bytes(len_bytes) as usize;

	if len > MAX_FRAME_LEN {
		return Err(IoError::new(
			ErrorKind::InvalidData,
			format!("frame too large: {len} bytes"),
		));
	}

	let mut body = vec![0u8; len];
	input.read_exact(&mut body).await?;
	Ok(body)
}

/// Writes one length-prefixed frame body.
pub async fn write_frame(
	output: &mut (impl AsyncWrite + Unpin),
	body: &[u8],
) -> std::io::Result<()> {
	if body.len() > MAX_FRAME_LEN {
		return Err(IoError::new(
			ErrorKind::InvalidData,
			format!("frame too large: {} bytes", body.len()),
		));
	}

	output.write_all(&(body.len() as u32).to_le_bytes()).await?;
	output.write_all(body).await?;
	output.flush().await?;
	Ok(())
}

/// Whether a frame-loop error means the peer went away.
#[must_use]
pub fn is_disconnect(err: &IoError) -> bool {
	matches!(
		err.kind(),
		ErrorKind::UnexpectedEof | ErrorKind::BrokenPipe | ErrorKind::ConnectionReset
	)
}

/// Builds a publication body: identifier bytes, `0x00`, payload.
///
/// Subscription filters are byte-prefix matches on this body, so the
/// identifier grammar (every segment slash-terminated) makes each
/// wildcard form a valid filter.
#[must_use]
pub fn encode_publication(identifier: &str, payload: &[u8]) -> Vec<u8> {
	let mut body = Vec::with_capacity(identifier.len() + 1 + payload.len());
	body.extend_from_slice(identifier.as_bytes());
	body.push(0);
	body.extend_from_slice(payload);
	body
}

/// Splits a publication body back into identifier and payload.
///
/// Returns `None` when the NUL separator is missing or the identifier
/// is not valid UTF-8.
#[must_use]
pub fn split_publication(body: &[u8]) -> Option<(&str, &[u8])> {
	let nul = body.iter().position(|&b| b == 0)?;
	let identifier = std::str::from_utf8(&body[..nul]).ok()?;
	Some((identifier, &body[nul + 1..]))
}

/// A subscription control body on the subscriber connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubControl<'a> {
	Subscribe(&'a [u8]),
	Unsubscribe(&'a [u8]),
}

/// Builds a subscribe control body (`0x01` + filter).
#[must_use]
pub fn encode_subscribe(filter: &[u8]) -> Vec<u8> {
	let mut body = Vec::with_capacity(filter.len() + 1);
	body.push(1);
	body.extend_from_slice(filter);
	body
}

/// Builds an unsubscribe control body (`0x00` + filter).
#[must_use]
pub fn encode_unsubscribe(filter: &[u8]) -> Vec<u8> {
	let mut body = Vec::with_capacity(filter.len() + 1);
	body.push(0);
	body.extend_from_slice(filter);
	body
}

/// Parses a subscription control body.
#[must_use]
pub fn parse_sub_control(body: &[u8]) -> Option<SubControl<'_>> {
	match body.split_first()? {
		(1, filter) => Some(SubControl::Subscribe(filter)),
		(0, filter) => Some(SubControl::Unsubscribe(filter)),
		_ => None,
	}
}
