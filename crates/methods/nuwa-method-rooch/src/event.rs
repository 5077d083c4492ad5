//! The `DIDCreatedEvent` schema, parser, and string fallback.
//!
//! The chain emits the created DID inside the event payload; parsing it is
//! the only way to learn a chain-allocated address. The structured parser
//! follows the canonical layout (u32-BE length-prefixed UTF-8 strings, u32
//! counts). When a node serves a drifted schema, [`extract_did_fallback`]
//! scans the raw bytes for a `did:rooch:` pattern instead.

use nuwa_types::chain::ChainError;
use nuwa_types::did::Did;

use crate::entry::DID_CREATED_EVENT;

/// A parsed `0x3::did::DIDCreatedEvent`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DidCreatedEvent {
    pub did: Did,
    pub object_id: String,
    pub controllers: Vec<Did>,
    pub creator_address: String,
    pub creation_method: String,
}

/// Parses an event payload against the canonical schema.
pub fn parse_did_created_event(data: &[u8]) -> Result<DidCreatedEvent, ChainError> {
    let mut reader = EventReader(data);
    let did = reader.did()?;
    let object_id = reader.string("objectId")?;
    let controller_count = reader.u32("controllers length")?;
    let mut controllers = Vec::with_capacity(controller_count.min(64) as usize);
    for _ in 0..controller_count {
        controllers.push(reader.did()?);
    }
    let creator_address = reader.string("creatorAddress")?;
    let creation_method = reader.string("creationMethod")?;
    if !reader.0.is_empty() {
        return Err(mismatch("trailing bytes after event"));
    }
    Ok(DidCreatedEvent {
        did,
        object_id,
        controllers,
        creator_address,
        creation_method,
    })
}

/// Encodes an event into its canonical payload. Used by test fixtures and
/// the in-memory chain.
pub fn encode_did_created_event(event: &DidCreatedEvent) -> Vec<u8> {
    let mut out = Vec::new();
    push_did(&mut out, &event.did);
    push_string(&mut out, &event.object_id);
    out.extend_from_slice(&(event.controllers.len() as u32).to_be_bytes());
    for controller in &event.controllers {
        push_did(&mut out, controller);
    }
    push_string(&mut out, &event.creator_address);
    push_string(&mut out, &event.creation_method);
    out
}

/// Best-effort DID recovery: scans the payload for a `did:rooch:` pattern
/// and takes the identifier characters that follow.
pub fn extract_did_fallback(data: &[u8]) -> Option<Did> {
    const NEEDLE: &[u8] = b"did:rooch:";
    let start = data
        .windows(NEEDLE.len())
        .position(|window| window == NEEDLE)?;
    let identifier_start = start + NEEDLE.len();
    let identifier: String = data[identifier_start..]
        .iter()
        .take_while(|b| b.is_ascii_alphanumeric() || **b == b'_')
        .map(|b| *b as char)
        .collect();
    if identifier.is_empty() {
        return None;
    }
    Some(Did::rooch(identifier))
}

fn push_string(out: &mut Vec<u8>, s: &str) {
    out.extend_from_slice(&(s.len() as u32).to_be_bytes());
    out.extend_from_slice(s.as_bytes());
}

// DIDs travel as full `did:<method>:<identifier>` strings so that the
// string fallback can recover them from otherwise unreadable payloads.
fn push_did(out: &mut Vec<u8>, did: &Did) {
    push_string(out, &did.to_string());
}

fn mismatch(reason: &str) -> ChainError {
    ChainError::EventSchemaMismatch {
        event_type: DID_CREATED_EVENT.into(),
        reason: reason.into(),
    }
}

struct EventReader<'a>(&'a [u8]);

impl<'a> EventReader<'a> {
    fn take(&mut self, n: usize, field: &str) -> Result<&'a [u8], ChainError> {
        if self.0.len() < n {
            return Err(mismatch(&format!("unexpected end reading {field}")));
        }
        let (head, tail) = self.0.split_at(n);
        self.0 = tail;
        Ok(head)
    }

    fn u32(&mut self, field: &str) -> Result<u32, ChainError> {
        let bytes = self.take(4, field)?;
        Ok(u32::from_be_bytes(bytes.try_into().expect("4 bytes")))
    }

    fn string(&mut self, field: &str) -> Result<String, ChainError> {
        let len = self.u32(field)? as usize;
        if len > self.0.len() {
            return Err(mismatch(&format!("{field} length {len} exceeds payload")));
        }
        let bytes = self.take(len, field)?;
        String::from_utf8(bytes.to_vec())
            .map_err(|_| mismatch(&format!("{field} is not valid UTF-8")))
    }

    fn did(&mut self) -> Result<Did, ChainError> {
        let s = self.string("did")?;
        s.parse::<Did>()
            .map_err(|e| mismatch(&e.to_string()))
    }
}
