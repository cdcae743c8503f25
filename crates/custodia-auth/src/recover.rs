//! Canonical secp256k1 signer recovery.
//!
//! A signature is exactly 65 bytes: `r (32) || s (32) || v (1)`, with
//! `v ∈ {27, 28}` (or the raw recovery ids `{0, 1}`, normalized to 27/28).
//! Malleable encodings are rejected: `r = 0`, `s = 0`, and `s > n/2` never
//! recover to an address.

use alloy_primitives::{Address, B256, keccak256};
use custodia_types::{CustodiaError, Result, constants};
use k256::ecdsa::{RecoveryId, Signature, VerifyingKey};
use k256::elliptic_curve::sec1::ToEncodedPoint;

/// A parsed, length-checked signature. Canonicality is checked at recovery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawSignature {
    pub r: [u8; 32],
    pub s: [u8; 32],
    /// Always 27 or 28 after parsing.
    pub v: u8,
}

impl RawSignature {
    /// Split a 65-byte blob. Normalizes `v` from {0, 1} to {27, 28}.
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != constants::SIGNATURE_LEN {
            return Err(CustodiaError::InvalidSignatureFormat { len: bytes.len() });
        }
        let mut r = [0u8; 32];
        let mut s = [0u8; 32];
        r.copy_from_slice(&bytes[..32]);
        s.copy_from_slice(&bytes[32..64]);
        let v = match bytes[64] {
            0 | 1 => bytes[64] + constants::V_LOW,
            v @ (constants::V_LOW | constants::V_HIGH) => v,
            v => return Err(CustodiaError::InvalidSignatureEncoding { v }),
        };
        Ok(Self { r, s, v })
    }

    #[must_use]
    pub fn to_bytes(&self) -> [u8; 65] {
        let mut out = [0u8; 65];
        out[..32].copy_from_slice(&self.r);
        out[32..64].copy_from_slice(&self.s);
        out[64] = self.v;
        out
    }

    /// `r != 0`, `s != 0`, `s <= n/2`.
    #[must_use]
    pub fn is_canonical(&self) -> bool {
        self.r != [0u8; 32] && self.s != [0u8; 32] && self.s <= constants::SECP256K1_HALF_ORDER
    }

    fn recovery_id(&self) -> u8 {
        self.v - constants::V_LOW
    }
}

/// Recover the address that produced `signature` over `digest`.
///
/// The caller compares the result with the claimed owner; this function
/// never decides authorization by itself.
pub fn recover_signer(digest: &B256, signature: &[u8]) -> Result<Address> {
    let raw = RawSignature::parse(signature)?;
    if raw.r == [0u8; 32] || raw.s == [0u8; 32] {
        return Err(CustodiaError::RecoveryFailure {
            reason: "zero r or s".into(),
        });
    }
    if raw.s > constants::SECP256K1_HALF_ORDER {
        return Err(CustodiaError::RecoveryFailure {
            reason: "s is in the upper half of the curve order".into(),
        });
    }

    let mut rs = [0u8; 64];
    rs[..32].copy_from_slice(&raw.r);
    rs[32..].copy_from_slice(&raw.s);
    let sig = Signature::from_slice(&rs).map_err(|e| CustodiaError::RecoveryFailure {
        reason: e.to_string(),
    })?;
    let rid = RecoveryId::from_byte(raw.recovery_id())
        .ok_or(CustodiaError::InvalidSignatureEncoding { v: raw.v })?;
    let key = VerifyingKey::recover_from_prehash(digest.as_slice(), &sig, rid).map_err(|e| {
        CustodiaError::RecoveryFailure {
            reason: e.to_string(),
        }
    })?;
    Ok(address_from_verifying_key(&key))
}

/// `keccak256(uncompressed_pubkey[1..])[12..]`
#[must_use]
pub fn address_from_verifying_key(key: &VerifyingKey) -> Address {
    let point = key.to_encoded_point(false);
    let hash = keccak256(&point.as_bytes()[1..]);
    Address::from_slice(&hash[12..])
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::{address, b256, hex};

    const DIGEST: B256 = b256!("b7b30809bf6cfa8c30add4a47fd378cea409d86f2637237fade9639af6e4675a");
    const SIGNER: Address = address!("90f8bf6a479f320ead074411a4b0e7944ea8c9c1");

    fn known_sig() -> Vec<u8> {
        hex::decode(
            "085fe2ca7a5758957ea811bd8e743d9cee6bc20072f1470a888c43a1091a8e8b\
             7bf8be1c342ad83faeda08ac2ce601504393efc40cc1aa5780ab3f990dddd10e1c",
        )
        .unwrap()
    }

    #[test]
    fn recovers_known_signer() {
        assert_eq!(recover_signer(&DIGEST, &known_sig()).unwrap(), SIGNER);
    }

    #[test]
    fn raw_recovery_id_is_normalized() {
        let mut sig = known_sig();
        sig[64] = 1;
        assert_eq!(recover_signer(&DIGEST, &sig).unwrap(), SIGNER);
        assert_eq!(RawSignature::parse(&sig).unwrap().v, 28);
    }

    #[test]
    fn high_s_twin_is_rejected() {
        let twin = hex::decode(
            "085fe2ca7a5758957ea811bd8e743d9cee6bc20072f1470a888c43a1091a8e8b\
             840741e3cbd527c05125f753d319feae771aed22a286f5e43f271ef3c25870331b",
        )
        .unwrap();
        let err = recover_signer(&DIGEST, &twin).unwrap_err();
        assert!(matches!(err, CustodiaError::RecoveryFailure { .. }), "{err}");
    }

    #[test]
    fn wrong_length_is_format_error() {
        for len in [0usize, 64, 66, 130] {
            let err = recover_signer(&DIGEST, &vec![1u8; len]).unwrap_err();
            assert!(matches!(err, CustodiaError::InvalidSignatureFormat { len: l } if l == len));
        }
    }

    #[test]
    fn bad_v_is_encoding_error() {
        for v in [2u8, 26, 29, 35, 0xff] {
            let mut sig = known_sig();
            sig[64] = v;
            let err = recover_signer(&DIGEST, &sig).unwrap_err();
            assert!(matches!(err, CustodiaError::InvalidSignatureEncoding { v: got } if got == v));
        }
    }

    #[test]
    fn zero_r_or_s_is_recovery_failure() {
        let mut zero_r = known_sig();
        zero_r[..32].fill(0);
        assert!(matches!(
            recover_signer(&DIGEST, &zero_r),
            Err(CustodiaError::RecoveryFailure { .. })
        ));
        let mut zero_s = known_sig();
        zero_s[32..64].fill(0);
        assert!(matches!(
            recover_signer(&DIGEST, &zero_s),
            Err(CustodiaError::RecoveryFailure { .. })
        ));
    }

    #[test]
    fn other_digest_recovers_other_address() {
        let other = B256::repeat_byte(0x42);
        match recover_signer(&other, &known_sig()) {
            Ok(addr) => assert_ne!(addr, SIGNER),
            Err(err) => assert!(matches!(err, CustodiaError::RecoveryFailure { .. })),
        }
    }

    #[test]
    fn parse_roundtrips_bytes() {
        let sig = known_sig();
        let raw = RawSignature::parse(&sig).unwrap();
        assert!(raw.is_canonical());
        assert_eq!(raw.to_bytes().to_vec(), sig);
    }
}
