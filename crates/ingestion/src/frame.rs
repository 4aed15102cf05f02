//! Replay-file frame codec
//!
//! One event per frame: a 1-byte tag, then length-prefixed (u32 LE) byte
//! fields. `SyntheticFlush` is dispatcher-internal and has no frame tag; a
//! replay file that contained one would be malformed.

use std::io::{ErrorKind, Read, Write};

use bytes::Bytes;
use contracts::{BulkRecord, ContractError, MutationOp, PhaseMark, StreamEvent};

const TAG_BEGIN_SNAPSHOT: u8 = 0x01;
const TAG_END_SNAPSHOT: u8 = 0x02;
const TAG_BEGIN_MUTATIONS: u8 = 0x03;
const TAG_END_MUTATIONS: u8 = 0x04;
const TAG_BULK: u8 = 0x05;
const TAG_MUTATION: u8 = 0x06;
const TAG_CLOSE: u8 = 0x07;

/// Largest field the decoder will buffer. A length prefix beyond this is a
/// corrupt frame, not a record worth allocating for.
const MAX_FIELD_LEN: usize = 64 * 1024 * 1024;

/// Encode one event.
///
/// # Errors
/// IO errors from the writer; `SourceDecode` for the internal-only
/// `SyntheticFlush`, which has no wire representation.
pub fn write_event<W: Write>(writer: &mut W, event: &StreamEvent) -> Result<(), ContractError> {
    match event {
        StreamEvent::Phase(mark) => writer.write_all(&[phase_tag(*mark)])?,
        StreamEvent::Bulk(record) => {
            writer.write_all(&[TAG_BULK])?;
            write_bytes(writer, &record.key)?;
            write_bytes(writer, &record.payload)?;
        }
        StreamEvent::Mutation(op) => {
            writer.write_all(&[TAG_MUTATION])?;
            match &op.key {
                Some(key) => {
                    writer.write_all(&[1])?;
                    write_bytes(writer, key)?;
                }
                None => writer.write_all(&[0])?,
            }
            write_bytes(writer, &op.payload)?;
        }
        StreamEvent::StreamClose => writer.write_all(&[TAG_CLOSE])?,
        StreamEvent::SyntheticFlush => {
            return Err(ContractError::source_decode(
                "synthetic flush has no frame representation",
            ))
        }
    }
    Ok(())
}

/// Decode the next event; `None` on a clean end of stream.
///
/// # Errors
/// `SourceDecode` for unknown tags, a truncated frame, or a length prefix
/// beyond the field limit.
pub fn read_event<R: Read>(reader: &mut R) -> Result<Option<StreamEvent>, ContractError> {
    let mut tag = [0u8; 1];
    match reader.read_exact(&mut tag) {
        Ok(()) => {}
        Err(e) if e.kind() == ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }

    let event = match tag[0] {
        TAG_BEGIN_SNAPSHOT => StreamEvent::Phase(PhaseMark::BeginSnapshot),
        TAG_END_SNAPSHOT => StreamEvent::Phase(PhaseMark::EndSnapshot),
        TAG_BEGIN_MUTATIONS => StreamEvent::Phase(PhaseMark::BeginMutations),
        TAG_END_MUTATIONS => StreamEvent::Phase(PhaseMark::EndMutations),
        TAG_BULK => StreamEvent::Bulk(BulkRecord {
            key: read_bytes(reader)?,
            payload: read_bytes(reader)?,
        }),
        TAG_MUTATION => {
            let mut has_key = [0u8; 1];
            read_field(reader, &mut has_key)?;
            let key = match has_key[0] {
                0 => None,
                1 => Some(read_bytes(reader)?),
                other => {
                    return Err(ContractError::source_decode(format!(
                        "invalid mutation key marker 0x{other:02x}"
                    )))
                }
            };
            StreamEvent::Mutation(MutationOp {
                key,
                payload: read_bytes(reader)?,
            })
        }
        TAG_CLOSE => StreamEvent::StreamClose,
        other => {
            return Err(ContractError::source_decode(format!(
                "unknown frame tag 0x{other:02x}"
            )))
        }
    };
    Ok(Some(event))
}

fn phase_tag(mark: PhaseMark) -> u8 {
    match mark {
        PhaseMark::BeginSnapshot => TAG_BEGIN_SNAPSHOT,
        PhaseMark::EndSnapshot => TAG_END_SNAPSHOT,
        PhaseMark::BeginMutations => TAG_BEGIN_MUTATIONS,
        PhaseMark::EndMutations => TAG_END_MUTATIONS,
    }
}

fn write_bytes<W: Write>(writer: &mut W, bytes: &[u8]) -> std::io::Result<()> {
    writer.write_all(&(bytes.len() as u32).to_le_bytes())?;
    writer.write_all(bytes)
}

fn read_bytes<R: Read>(reader: &mut R) -> Result<Bytes, ContractError> {
    let mut len = [0u8; 4];
    read_field(reader, &mut len)?;
    let len = u32::from_le_bytes(len) as usize;
    if len > MAX_FIELD_LEN {
        return Err(ContractError::source_decode(format!(
            "field length {len} exceeds the {MAX_FIELD_LEN} byte limit"
        )));
    }
    let mut buf = vec![0u8; len];
    read_field(reader, &mut buf)?;
    Ok(Bytes::from(buf))
}

/// Inside a frame, EOF means truncation, not a clean end of stream.
fn read_field<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<(), ContractError> {
    reader.read_exact(buf).map_err(|e| {
        if e.kind() == ErrorKind::UnexpectedEof {
            ContractError::source_decode("truncated frame")
        } else {
            ContractError::Io(e)
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_events() -> Vec<StreamEvent> {
        vec![
            StreamEvent::Phase(PhaseMark::BeginSnapshot),
            StreamEvent::Bulk(BulkRecord {
                key: Bytes::from_static(b"{a}1"),
                payload: Bytes::from_static(b"payload-1"),
            }),
            StreamEvent::Phase(PhaseMark::EndSnapshot),
            StreamEvent::Phase(PhaseMark::BeginMutations),
            StreamEvent::Mutation(MutationOp {
                key: None,
                payload: Bytes::from_static(b"FLUSHALL"),
            }),
            StreamEvent::Mutation(MutationOp {
                key: Some(Bytes::from_static(b"a")),
                payload: Bytes::from_static(b"SET a 1"),
            }),
            StreamEvent::StreamClose,
        ]
    }

    #[test]
    fn test_codec_round_trip() {
        let mut buf = Vec::new();
        for event in sample_events() {
            write_event(&mut buf, &event).unwrap();
        }
        let mut reader = buf.as_slice();
        let mut decoded = Vec::new();
        while let Some(event) = read_event(&mut reader).unwrap() {
            decoded.push(event);
        }
        assert_eq!(decoded, sample_events());
    }

    #[test]
    fn test_synthetic_flush_is_not_encodable() {
        let mut buf = Vec::new();
        assert!(write_event(&mut buf, &StreamEvent::SyntheticFlush).is_err());
    }

    #[test]
    fn test_unknown_tag_is_decode_error() {
        let mut reader = [0xEEu8].as_slice();
        assert!(matches!(
            read_event(&mut reader).unwrap_err(),
            ContractError::SourceDecode { .. }
        ));
    }

    #[test]
    fn test_oversized_length_prefix_is_decode_error() {
        // A corrupt prefix claiming 4 GiB must fail before any allocation.
        let mut buf = vec![TAG_BULK];
        buf.extend_from_slice(&u32::MAX.to_le_bytes());
        let mut reader = buf.as_slice();
        assert!(matches!(
            read_event(&mut reader).unwrap_err(),
            ContractError::SourceDecode { .. }
        ));
    }

    #[test]
    fn test_truncated_frame_is_decode_error() {
        let mut buf = Vec::new();
        write_event(
            &mut buf,
            &StreamEvent::Bulk(BulkRecord {
                key: Bytes::from_static(b"key"),
                payload: Bytes::from_static(b"value"),
            }),
        )
        .unwrap();
        buf.truncate(buf.len() - 2);
        let mut reader = buf.as_slice();
        assert!(matches!(
            read_event(&mut reader).unwrap_err(),
            ContractError::SourceDecode { .. }
        ));
    }
}
