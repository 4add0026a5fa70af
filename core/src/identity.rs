//! Identity keys for face vectors.
//!
//! The key is SHA-256 over a fixed binary encoding of the vector and its
//! optional label, so it does not depend on float formatting, locale or
//! serializer settings:
//!
//! ```text
//! "faceproof:v1"
//! u32 LE   component count
//! f32 LE   each component (-0.0 written as 0.0)
//! 0x00                              no label
//! 0x01 u32 LE len, UTF-8 bytes      label
//! ```

use sha2::{Digest, Sha256};

use crate::error::CoreError;

const DOMAIN_TAG: &[u8] = b"faceproof:v1";

/// Canonical byte encoding hashed by [`identity_hash`].
pub fn canonical_bytes(vector: &[f32], label: Option<&str>) -> Result<Vec<u8>, CoreError> {
    let label_len = label.map_or(0, |l| 4 + l.len());
    let mut buf = Vec::with_capacity(DOMAIN_TAG.len() + 4 + vector.len() * 4 + 1 + label_len);
    buf.extend_from_slice(DOMAIN_TAG);
    buf.extend_from_slice(&(vector.len() as u32).to_le_bytes());
    for (i, &x) in vector.iter().enumerate() {
        if !x.is_finite() {
            return Err(CoreError::NonFiniteComponent(i));
        }
        let x = if x == 0.0 { 0.0f32 } else { x };
        buf.extend_from_slice(&x.to_le_bytes());
    }
    match label {
        Some(label) => {
            buf.push(0x01);
            buf.extend_from_slice(&(label.len() as u32).to_le_bytes());
            buf.extend_from_slice(label.as_bytes());
        }
        None => buf.push(0x00),
    }
    Ok(buf)
}

/// Identity key of a vector: 64 lowercase hex characters.
pub fn identity_hash(vector: &[f32], label: Option<&str>) -> Result<String, CoreError> {
    let bytes = canonical_bytes(vector, label)?;
    Ok(hex::encode(Sha256::digest(&bytes)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_is_stable() {
        let v = vec![0.25f32, -0.5, 1.0];
        let a = identity_hash(&v, None).unwrap();
        let b = identity_hash(&v.clone(), None).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn test_encoding_layout() {
        let bytes = canonical_bytes(&[1.0], Some("ab")).unwrap();
        let mut want = b"faceproof:v1".to_vec();
        want.extend_from_slice(&1u32.to_le_bytes());
        want.extend_from_slice(&1.0f32.to_le_bytes());
        want.push(0x01);
        want.extend_from_slice(&2u32.to_le_bytes());
        want.extend_from_slice(b"ab");
        assert_eq!(bytes, want);
    }

    #[test]
    fn test_negative_zero_normalized() {
        assert_eq!(
            identity_hash(&[-0.0, 1.0], None).unwrap(),
            identity_hash(&[0.0, 1.0], None).unwrap()
        );
    }

    #[test]
    fn test_label_changes_key() {
        let v = [0.6f32, 0.8];
        let none = identity_hash(&v, None).unwrap();
        let empty = identity_hash(&v, Some("")).unwrap();
        let alice = identity_hash(&v, Some("alice")).unwrap();
        assert_ne!(none, empty);
        assert_ne!(empty, alice);
    }

    #[test]
    fn test_length_is_part_of_key() {
        assert_ne!(
            identity_hash(&[1.0, 0.0], None).unwrap(),
            identity_hash(&[1.0, 0.0, 0.0], None).unwrap()
        );
    }

    #[test]
    fn test_non_finite_rejected() {
        assert!(matches!(
            identity_hash(&[0.0, f32::NAN], None),
            Err(CoreError::NonFiniteComponent(1))
        ));
        assert!(matches!(
            identity_hash(&[f32::NEG_INFINITY], None),
            Err(CoreError::NonFiniteComponent(0))
        ));
    }
}
