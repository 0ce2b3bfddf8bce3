//! Session tokens: opaque, MAC-signed blobs returned by Begin-style RPCs
//! (spec.md §4.1, §9 "Session tokens as values").
//!
//! The payload is a fixed, versioned little-endian byte layout rather than a
//! generic serde wire format, since the wire shape here is small, fixed, and
//! worth controlling byte-for-byte for a token a client also has to
//! round-trip opaquely.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::convert::TryInto;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::error::{invalid, ApiError};
use crate::ids::{PieceId, SegmentPosition, StreamId};
use crate::model::RedundancyScheme;

type HmacSha256 = Hmac<Sha256>;

const STREAM_TOKEN_TAG: u8 = 1;
const SEGMENT_TOKEN_TAG: u8 = 2;
const MAC_LEN: usize = 32;

/// The server-side key used to MAC-sign session tokens. Immutable for the
/// process lifetime (spec.md §5 "Shared state").
#[derive(Clone)]
pub struct SigningKey([u8; 32]);

impl SigningKey {
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn generate() -> Self {
        use rand::RngCore;
        let mut bytes = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(bytes)
    }

    fn sign(&self, payload: &[u8]) -> [u8; MAC_LEN] {
        let mut mac = HmacSha256::new_from_slice(&self.0).expect("HMAC accepts any key length");
        mac.update(payload);
        mac.finalize().into_bytes().into()
    }

    fn verify(&self, payload: &[u8], mac_bytes: &[u8]) -> bool {
        let mut mac = HmacSha256::new_from_slice(&self.0).expect("HMAC accepts any key length");
        mac.update(payload);
        mac.verify_slice(mac_bytes).is_ok()
    }
}

fn now_unix() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before epoch")
        .as_secs() as i64
}

fn write_bytes(buf: &mut Vec<u8>, data: &[u8]) {
    buf.extend_from_slice(&(data.len() as u32).to_le_bytes());
    buf.extend_from_slice(data);
}

fn read_bytes(buf: &[u8], cursor: &mut usize) -> Result<Vec<u8>, ApiError> {
    let len = read_u32(buf, cursor)? as usize;
    let end = cursor
        .checked_add(len)
        .filter(|&e| e <= buf.len())
        .ok_or_else(|| invalid("truncated token"))?;
    let data = buf[*cursor..end].to_vec();
    *cursor = end;
    Ok(data)
}

fn read_u32(buf: &[u8], cursor: &mut usize) -> Result<u32, ApiError> {
    let end = cursor
        .checked_add(4)
        .filter(|&e| e <= buf.len())
        .ok_or_else(|| invalid("truncated token"))?;
    let value = u32::from_le_bytes(buf[*cursor..end].try_into().unwrap());
    *cursor = end;
    Ok(value)
}

fn read_u16(buf: &[u8], cursor: &mut usize) -> Result<u16, ApiError> {
    let end = cursor
        .checked_add(2)
        .filter(|&e| e <= buf.len())
        .ok_or_else(|| invalid("truncated token"))?;
    let value = u16::from_le_bytes(buf[*cursor..end].try_into().unwrap());
    *cursor = end;
    Ok(value)
}

fn read_i64(buf: &[u8], cursor: &mut usize) -> Result<i64, ApiError> {
    let end = cursor
        .checked_add(8)
        .filter(|&e| e <= buf.len())
        .ok_or_else(|| invalid("truncated token"))?;
    let value = i64::from_le_bytes(buf[*cursor..end].try_into().unwrap());
    *cursor = end;
    Ok(value)
}

fn write_redundancy(buf: &mut Vec<u8>, rs: &RedundancyScheme) {
    buf.extend_from_slice(&rs.required_shares.to_le_bytes());
    buf.extend_from_slice(&rs.repair_shares.to_le_bytes());
    buf.extend_from_slice(&rs.optimal_shares.to_le_bytes());
    buf.extend_from_slice(&rs.total_shares.to_le_bytes());
    buf.extend_from_slice(&rs.share_size.to_le_bytes());
}

fn read_redundancy(buf: &[u8], cursor: &mut usize) -> Result<RedundancyScheme, ApiError> {
    let required_shares = read_u16(buf, cursor)?;
    let repair_shares = read_u16(buf, cursor)?;
    let optimal_shares = read_u16(buf, cursor)?;
    let total_shares = read_u16(buf, cursor)?;
    let share_size = read_u32(buf, cursor)? as i32;
    Ok(RedundancyScheme {
        required_shares,
        repair_shares,
        optimal_shares,
        total_shares,
        share_size,
    })
}

/// Everything the server needs to remember about one upload stream,
/// round-tripped opaquely through the client (spec.md §4.1).
#[derive(Debug, Clone)]
pub struct StreamToken {
    pub bucket: String,
    pub encrypted_object_key: Vec<u8>,
    pub version: i64,
    pub redundancy: RedundancyScheme,
    pub created_at: i64,
    pub expires_at: i64,
    pub stream_id: StreamId,
}

impl StreamToken {
    fn serialize_payload(&self) -> Vec<u8> {
        let mut buf = vec![STREAM_TOKEN_TAG];
        write_bytes(&mut buf, self.bucket.as_bytes());
        write_bytes(&mut buf, &self.encrypted_object_key);
        buf.extend_from_slice(&self.version.to_le_bytes());
        write_redundancy(&mut buf, &self.redundancy);
        buf.extend_from_slice(&self.created_at.to_le_bytes());
        buf.extend_from_slice(&self.expires_at.to_le_bytes());
        buf.extend_from_slice(self.stream_id.as_bytes());
        buf
    }

    fn deserialize_payload(buf: &[u8]) -> Result<Self, ApiError> {
        let mut cursor = 0usize;
        let tag = *buf.first().ok_or_else(|| invalid("empty token"))?;
        if tag != STREAM_TOKEN_TAG {
            return Err(invalid("not a stream token"));
        }
        cursor += 1;
        let bucket = String::from_utf8(read_bytes(buf, &mut cursor)?)
            .map_err(|_| invalid("token bucket is not valid utf-8"))?;
        let encrypted_object_key = read_bytes(buf, &mut cursor)?;
        let version = read_i64(buf, &mut cursor)?;
        let redundancy = read_redundancy(buf, &mut cursor)?;
        let created_at = read_i64(buf, &mut cursor)?;
        let expires_at = read_i64(buf, &mut cursor)?;
        let stream_bytes = read_bytes(buf, &mut cursor)?;
        if cursor != buf.len() {
            return Err(invalid("trailing bytes in token"));
        }
        let stream_id_bytes: [u8; 16] = stream_bytes
            .try_into()
            .map_err(|_| invalid("malformed stream id in token"))?;
        Ok(Self {
            bucket,
            encrypted_object_key,
            version,
            redundancy,
            created_at,
            expires_at,
            stream_id: StreamId::from_bytes(stream_id_bytes),
        })
    }

    /// Serializes, MAC-signs and base64-encodes this token for return to a
    /// client (spec.md §4.1).
    pub fn sign(&self, key: &SigningKey) -> String {
        sign_payload(key, self.serialize_payload())
    }

    /// Verifies the signature and freshness of a client-supplied stream
    /// token. Any failure collapses to `Invalid` per spec.md §4.1 — the
    /// caller must never learn why verification failed.
    pub fn verify(raw: &str, key: &SigningKey, ttl: Duration) -> Result<Self, ApiError> {
        let payload = verify_signed_payload(raw, key)?;
        let token = Self::deserialize_payload(&payload)?;
        check_freshness(token.created_at, ttl)?;
        Ok(token)
    }
}

/// Per-segment-upload session state (spec.md §4.1).
#[derive(Debug, Clone)]
pub struct SegmentToken {
    pub stream_id: StreamId,
    pub position: SegmentPosition,
    pub root_piece_id: PieceId,
    pub created_at: i64,
    pub expires_at: i64,
    /// Opaque, server-issued per-piece order limits — the Orders
    /// collaborator's concern (spec.md §6), carried here only as bytes.
    pub original_limits: Vec<Vec<u8>>,
}

impl SegmentToken {
    fn serialize_payload(&self) -> Vec<u8> {
        let mut buf = vec![SEGMENT_TOKEN_TAG];
        buf.extend_from_slice(self.stream_id.as_bytes());
        buf.extend_from_slice(&self.position.part.to_le_bytes());
        buf.extend_from_slice(&self.position.index.to_le_bytes());
        write_bytes(&mut buf, &self.root_piece_id.0);
        buf.extend_from_slice(&self.created_at.to_le_bytes());
        buf.extend_from_slice(&self.expires_at.to_le_bytes());
        buf.extend_from_slice(&(self.original_limits.len() as u32).to_le_bytes());
        for limit in &self.original_limits {
            write_bytes(&mut buf, limit);
        }
        buf
    }

    fn deserialize_payload(buf: &[u8]) -> Result<Self, ApiError> {
        let mut cursor = 0usize;
        let tag = *buf.first().ok_or_else(|| invalid("empty token"))?;
        if tag != SEGMENT_TOKEN_TAG {
            return Err(invalid("not a segment token"));
        }
        cursor += 1;
        let stream_bytes = buf
            .get(cursor..cursor + 16)
            .ok_or_else(|| invalid("truncated token"))?;
        let stream_id = StreamId::from_bytes(stream_bytes.try_into().unwrap());
        cursor += 16;
        let part = read_u32(buf, &mut cursor)?;
        let index = read_u32(buf, &mut cursor)?;
        let root_piece_bytes = read_bytes(buf, &mut cursor)?;
        let root_piece_id = PieceId(
            root_piece_bytes
                .try_into()
                .map_err(|_| invalid("malformed root piece id in token"))?,
        );
        let created_at = read_i64(buf, &mut cursor)?;
        let expires_at = read_i64(buf, &mut cursor)?;
        let limit_count = read_u32(buf, &mut cursor)? as usize;
        let mut original_limits = Vec::with_capacity(limit_count);
        for _ in 0..limit_count {
            original_limits.push(read_bytes(buf, &mut cursor)?);
        }
        if cursor != buf.len() {
            return Err(invalid("trailing bytes in token"));
        }
        Ok(Self {
            stream_id,
            position: SegmentPosition::new(part, index),
            root_piece_id,
            created_at,
            expires_at,
            original_limits,
        })
    }

    pub fn sign(&self, key: &SigningKey) -> String {
        sign_payload(key, self.serialize_payload())
    }

    pub fn verify(raw: &str, key: &SigningKey, ttl: Duration) -> Result<Self, ApiError> {
        let payload = verify_signed_payload(raw, key)?;
        let token = Self::deserialize_payload(&payload)?;
        check_freshness(token.created_at, ttl)?;
        Ok(token)
    }
}

fn sign_payload(key: &SigningKey, payload: Vec<u8>) -> String {
    let mac = key.sign(&payload);
    let mut out = payload;
    out.extend_from_slice(&mac);
    URL_SAFE_NO_PAD.encode(out)
}

fn verify_signed_payload(raw: &str, key: &SigningKey) -> Result<Vec<u8>, ApiError> {
    let decoded = URL_SAFE_NO_PAD
        .decode(raw)
        .map_err(|_| invalid("malformed token encoding"))?;
    if decoded.len() < MAC_LEN {
        return Err(invalid("malformed token encoding"));
    }
    let split = decoded.len() - MAC_LEN;
    let (payload, mac_bytes) = decoded.split_at(split);
    if !key.verify(payload, mac_bytes) {
        return Err(invalid("token signature verification failed"));
    }
    Ok(payload.to_vec())
}

/// Rejects tokens whose `CreationTime` is older than `ttl` (spec.md §4.1:
/// "rejects tokens whose CreationTime is older than 48 hours").
fn check_freshness(created_at: i64, ttl: Duration) -> Result<(), ApiError> {
    let age = now_unix() - created_at;
    if age < 0 || age as u64 > ttl.as_secs() {
        return Err(invalid("token has expired"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scheme() -> RedundancyScheme {
        RedundancyScheme {
            required_shares: 8,
            repair_shares: 9,
            optimal_shares: 10,
            total_shares: 11,
            share_size: 256,
        }
    }

    #[test]
    fn stream_token_round_trips() {
        let key = SigningKey::from_bytes([1u8; 32]);
        let token = StreamToken {
            bucket: "bucket".into(),
            encrypted_object_key: b"enc-key".to_vec(),
            version: 1,
            redundancy: scheme(),
            created_at: now_unix(),
            expires_at: now_unix() + 3600,
            stream_id: StreamId::new(),
        };
        let signed = token.sign(&key);
        let decoded = StreamToken::verify(&signed, &key, Duration::from_secs(3600)).unwrap();
        assert_eq!(decoded.bucket, token.bucket);
        assert_eq!(decoded.stream_id, token.stream_id);
        assert_eq!(decoded.version, token.version);
    }

    #[test]
    fn tampered_token_is_rejected() {
        let key = SigningKey::from_bytes([1u8; 32]);
        let token = StreamToken {
            bucket: "bucket".into(),
            encrypted_object_key: b"enc-key".to_vec(),
            version: 1,
            redundancy: scheme(),
            created_at: now_unix(),
            expires_at: now_unix() + 3600,
            stream_id: StreamId::new(),
        };
        let mut signed = token.sign(&key);
        signed.push('x');
        let err = StreamToken::verify(&signed, &key, Duration::from_secs(3600)).unwrap_err();
        assert!(matches!(err, ApiError::Invalid(_)));
    }

    #[test]
    fn wrong_key_is_rejected() {
        let key = SigningKey::from_bytes([1u8; 32]);
        let other = SigningKey::from_bytes([2u8; 32]);
        let token = StreamToken {
            bucket: "bucket".into(),
            encrypted_object_key: b"enc-key".to_vec(),
            version: 1,
            redundancy: scheme(),
            created_at: now_unix(),
            expires_at: now_unix() + 3600,
            stream_id: StreamId::new(),
        };
        let signed = token.sign(&key);
        let err = StreamToken::verify(&signed, &other, Duration::from_secs(3600)).unwrap_err();
        assert!(matches!(err, ApiError::Invalid(_)));
    }

    #[test]
    fn stale_token_is_rejected() {
        let key = SigningKey::from_bytes([1u8; 32]);
        let token = StreamToken {
            bucket: "bucket".into(),
            encrypted_object_key: b"enc-key".to_vec(),
            version: 1,
            redundancy: scheme(),
            created_at: now_unix() - 49 * 3600,
            expires_at: now_unix(),
            stream_id: StreamId::new(),
        };
        let signed = token.sign(&key);
        let err =
            StreamToken::verify(&signed, &key, Duration::from_secs(48 * 3600)).unwrap_err();
        assert!(matches!(err, ApiError::Invalid(_)));
    }

    #[test]
    fn segment_token_round_trips_with_limits() {
        let key = SigningKey::from_bytes([3u8; 32]);
        let token = SegmentToken {
            stream_id: StreamId::new(),
            position: SegmentPosition::new(0, 4),
            root_piece_id: PieceId::new(),
            created_at: now_unix(),
            expires_at: now_unix() + 100,
            original_limits: vec![b"limit-a".to_vec(), b"limit-b".to_vec()],
        };
        let signed = token.sign(&key);
        let decoded = SegmentToken::verify(&signed, &key, Duration::from_secs(3600)).unwrap();
        assert_eq!(decoded.position, token.position);
        assert_eq!(decoded.original_limits, token.original_limits);
    }
}
