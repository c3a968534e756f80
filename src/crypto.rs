//! Cryptographic utilities for x402 payments

use crate::error::SignerError;
use ethereum_types::{Address, H256};
use sha3::{Digest, Keccak256};

type CryptoResult<T> = std::result::Result<T, SignerError>;

/// Keccak-256 hash function
pub fn keccak256(data: &[u8]) -> [u8; 32] {
    Keccak256::digest(data).into()
}

/// EIP-712 typed data hashing for EIP-3009 `TransferWithAuthorization`
pub mod eip712 {
    use super::*;
    use ethereum_types::U256;

    const DOMAIN_TYPE: &str =
        "EIP712Domain(string name,string version,uint256 chainId,address verifyingContract)";
    const TRANSFER_TYPE: &str = "TransferWithAuthorization(address from,address to,uint256 value,uint256 validAfter,uint256 validBefore,bytes32 nonce)";

    /// EIP-712 domain of the token contract
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct Domain {
        pub name: String,
        pub version: String,
        pub chain_id: u64,
        pub verifying_contract: Address,
    }

    impl Domain {
        /// The domain separator
        pub fn separator(&self) -> H256 {
            let mut data = Vec::with_capacity(5 * 32);
            data.extend_from_slice(&keccak256(DOMAIN_TYPE.as_bytes()));
            data.extend_from_slice(&keccak256(self.name.as_bytes()));
            data.extend_from_slice(&keccak256(self.version.as_bytes()));
            data.extend_from_slice(&word_u256(U256::from(self.chain_id)));
            data.extend_from_slice(&word_address(self.verifying_contract));
            H256::from(keccak256(&data))
        }
    }

    /// EIP-3009 authorization message
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct TransferWithAuthorization {
        pub from: Address,
        pub to: Address,
        pub value: U256,
        pub valid_after: U256,
        pub valid_before: U256,
        pub nonce: H256,
    }

    impl TransferWithAuthorization {
        pub fn struct_hash(&self) -> H256 {
            let mut data = Vec::with_capacity(7 * 32);
            data.extend_from_slice(&keccak256(TRANSFER_TYPE.as_bytes()));
            data.extend_from_slice(&word_address(self.from));
            data.extend_from_slice(&word_address(self.to));
            data.extend_from_slice(&word_u256(self.value));
            data.extend_from_slice(&word_u256(self.valid_after));
            data.extend_from_slice(&word_u256(self.valid_before));
            data.extend_from_slice(self.nonce.as_bytes());
            H256::from(keccak256(&data))
        }

        /// keccak256(0x1901 || domainSeparator || structHash)
        pub fn signing_hash(&self, domain: &Domain) -> H256 {
            let mut data = Vec::with_capacity(2 + 2 * 32);
            data.extend_from_slice(&[0x19, 0x01]);
            data.extend_from_slice(domain.separator().as_bytes());
            data.extend_from_slice(self.struct_hash().as_bytes());
            H256::from(keccak256(&data))
        }
    }

    fn word_u256(value: U256) -> [u8; 32] {
        let mut word = [0u8; 32];
        value.to_big_endian(&mut word);
        word
    }

    fn word_address(address: Address) -> [u8; 32] {
        let mut word = [0u8; 32];
        word[12..].copy_from_slice(address.as_bytes());
        word
    }
}

/// Signature utilities
pub mod signature {
    use super::*;
    use k256::ecdsa::{RecoveryId, Signature as K256Signature, VerifyingKey};
    use k256::elliptic_curve::sec1::ToEncodedPoint;
    use secp256k1::{Message, PublicKey, Secp256k1, SecretKey};

    fn secret_key(private_key: &str) -> CryptoResult<SecretKey> {
        let bytes = hex::decode(private_key.trim_start_matches("0x"))
            .map_err(|_| SignerError::signing("Invalid hex private key"))?;
        SecretKey::from_slice(&bytes).map_err(|_| SignerError::signing("Invalid private key"))
    }

    /// Ethereum address of an uncompressed public key without its 0x04 tag
    fn address_from_public_key(uncompressed: &[u8]) -> Address {
        let hash = keccak256(uncompressed);
        Address::from_slice(&hash[12..])
    }

    /// Derive the account address controlled by a private key
    pub fn address_from_private_key(private_key: &str) -> CryptoResult<Address> {
        let secret_key = secret_key(private_key)?;
        let public_key = PublicKey::from_secret_key(&Secp256k1::new(), &secret_key);
        Ok(address_from_public_key(
            &public_key.serialize_uncompressed()[1..],
        ))
    }

    /// Sign a 32-byte hash, returning a 65-byte `r || s || v` hex signature with v in {27, 28}
    pub fn sign_hash(hash: H256, private_key: &str) -> CryptoResult<String> {
        let secret_key = secret_key(private_key)?;
        let message = Message::from_digest_slice(hash.as_bytes())
            .map_err(|_| SignerError::signing("Invalid message hash"))?;

        let signature = Secp256k1::new().sign_ecdsa_recoverable(&message, &secret_key);
        let (recovery_id, compact) = signature.serialize_compact();

        let mut bytes = [0u8; 65];
        bytes[..64].copy_from_slice(&compact);
        bytes[64] = 27 + recovery_id.to_i32() as u8;

        Ok(format!("0x{}", hex::encode(bytes)))
    }

    /// Recover the signing address from a hash and a 65-byte hex signature
    pub fn recover_address(hash: H256, signature: &str) -> CryptoResult<Address> {
        let bytes = hex::decode(signature.trim_start_matches("0x"))
            .map_err(|_| SignerError::signing("Invalid hex signature"))?;
        if bytes.len() != 65 {
            return Err(SignerError::signing("Signature must be 65 bytes"));
        }

        let v = bytes[64];
        let recovery_id = RecoveryId::from_byte(if v >= 27 { v - 27 } else { v })
            .ok_or_else(|| SignerError::signing("Invalid recovery ID"))?;
        let signature = K256Signature::try_from(&bytes[..64])
            .map_err(|_| SignerError::signing("Invalid signature format"))?;

        let verifying_key =
            VerifyingKey::recover_from_prehash(hash.as_bytes(), &signature, recovery_id)
                .map_err(|_| SignerError::signing("Failed to recover public key"))?;
        let point = verifying_key.as_affine().to_encoded_point(false);

        Ok(address_from_public_key(&point.as_bytes()[1..]))
    }

    /// Generate a random nonce for EIP-3009 authorization
    pub fn generate_nonce() -> H256 {
        use rand::RngCore;
        let mut bytes = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut bytes);
        H256::from(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ethereum_types::U256;
    use std::str::FromStr;

    // Hardhat's first default account
    const TEST_KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
    const TEST_ADDRESS: &str = "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266";

    #[test]
    fn test_keccak_of_empty_input() {
        assert_eq!(
            hex::encode(keccak256(b"")),
            "c5d2460186f7233c927e7db2dcc703c0e500b653ca82273b7bfad8045d85a470"
        );
    }

    #[test]
    fn test_address_from_private_key() {
        let address = signature::address_from_private_key(TEST_KEY).unwrap();
        assert_eq!(address, Address::from_str(TEST_ADDRESS).unwrap());
    }

    #[test]
    fn test_sign_and_recover() {
        let domain = eip712::Domain {
            name: "USD Coin".to_string(),
            version: "2".to_string(),
            chain_id: 8453,
            verifying_contract: Address::from_str("0x833589fCD6eDb6E08f4c7C32D4f71b54bdA02913")
                .unwrap(),
        };
        let message = eip712::TransferWithAuthorization {
            from: Address::from_str(TEST_ADDRESS).unwrap(),
            to: Address::from_str("0x209693Bc6afc0C5328bA36FaF03C514EF312287C").unwrap(),
            value: U256::from(10_000u64),
            valid_after: U256::from(1_745_323_800u64),
            valid_before: U256::from(1_745_323_985u64),
            nonce: signature::generate_nonce(),
        };

        let hash = message.signing_hash(&domain);
        let sig = signature::sign_hash(hash, TEST_KEY).unwrap();
        assert!(sig.starts_with("0x"));
        assert_eq!(sig.len(), 132);

        let recovered = signature::recover_address(hash, &sig).unwrap();
        assert_eq!(recovered, message.from);
    }

    #[test]
    fn test_domain_separator_depends_on_chain() {
        let base = eip712::Domain {
            name: "USDC".to_string(),
            version: "2".to_string(),
            chain_id: 8453,
            verifying_contract: Address::zero(),
        };
        let sepolia = eip712::Domain {
            chain_id: 84532,
            ..base.clone()
        };
        assert_ne!(base.separator(), sepolia.separator());
    }

    #[test]
    fn test_nonce_generation() {
        assert_ne!(signature::generate_nonce(), signature::generate_nonce());
    }

    #[test]
    fn test_recover_rejects_bad_signature() {
        assert!(signature::recover_address(H256::zero(), "0x1234").is_err());
    }
}
