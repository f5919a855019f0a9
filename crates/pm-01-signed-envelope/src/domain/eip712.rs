//! # EIP-712 Typed Structured Data
//!
//! Pure hashing of typed structs and signing domains. No I/O.
//!
//! ## Encoding Rules
//!
//! - `encodeType`: `Name(type1 name1,...)` followed by every referenced struct
//!   type, deduplicated and sorted by name
//! - `hashStruct(s) = keccak256(typeHash || encodeData(s))`
//! - atomic values are 32-byte words; `string`/`bytes` are keccak-hashed;
//!   nested structs contribute their own `hashStruct`
//! - `digest = keccak256(0x19 || 0x01 || domainSeparator || hashStruct(message))`
//!
//! The schema of a struct is carried by its value tree, so the type string and
//! the encoded data can never drift apart.

use shared_crypto::{keccak256, KeccakHasher};
use shared_types::{u256_word, Address, Hash, U256};
use std::collections::BTreeMap;

/// A single typed value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypedValue {
    /// `address`
    Address(Address),
    /// `uint256`
    Uint(U256),
    /// `bytes32`
    FixedBytes([u8; 32]),
    /// `bytes`
    Bytes(Vec<u8>),
    /// `string`
    String(String),
    /// A nested struct, referenced by its type name.
    Struct(TypedStruct),
}

impl TypedValue {
    /// Solidity type name of this value.
    #[must_use]
    pub fn type_name(&self) -> &str {
        match self {
            Self::Address(_) => "address",
            Self::Uint(_) => "uint256",
            Self::FixedBytes(_) => "bytes32",
            Self::Bytes(_) => "bytes",
            Self::String(_) => "string",
            Self::Struct(s) => &s.name,
        }
    }

    fn encode_word(&self) -> Hash {
        match self {
            Self::Address(a) => a.to_word(),
            Self::Uint(v) => u256_word(v),
            Self::FixedBytes(b) => *b,
            Self::Bytes(b) => keccak256(b),
            Self::String(s) => keccak256(s.as_bytes()),
            Self::Struct(s) => s.hash_struct(),
        }
    }
}

/// A named struct with ordered, named fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypedStruct {
    /// Struct type name (e.g. `SelectProvider`).
    pub name: String,
    /// Fields in declaration order.
    pub fields: Vec<(String, TypedValue)>,
}

impl TypedStruct {
    /// Start a struct of the given type.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
        }
    }

    /// Append a field.
    #[must_use]
    pub fn field(mut self, name: impl Into<String>, value: TypedValue) -> Self {
        self.fields.push((name.into(), value));
        self
    }

    /// Look up a field value by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&TypedValue> {
        self.fields.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    /// Encoding of this struct's own type, without referenced types.
    fn own_type(&self) -> String {
        let members: Vec<String> = self
            .fields
            .iter()
            .map(|(name, value)| format!("{} {}", value.type_name(), name))
            .collect();
        format!("{}({})", self.name, members.join(","))
    }

    fn collect_referenced(&self, out: &mut BTreeMap<String, String>) {
        for (_, value) in &self.fields {
            if let TypedValue::Struct(inner) = value {
                out.entry(inner.name.clone())
                    .or_insert_with(|| inner.own_type());
                inner.collect_referenced(out);
            }
        }
    }

    /// Full `encodeType` string.
    #[must_use]
    pub fn encode_type(&self) -> String {
        let mut referenced = BTreeMap::new();
        self.collect_referenced(&mut referenced);
        referenced.remove(&self.name);

        let mut out = self.own_type();
        for encoded in referenced.values() {
            out.push_str(encoded);
        }
        out
    }

    /// `keccak256(encodeType)`.
    #[must_use]
    pub fn type_hash(&self) -> Hash {
        keccak256(self.encode_type().as_bytes())
    }

    /// `hashStruct`.
    #[must_use]
    pub fn hash_struct(&self) -> Hash {
        let mut hasher = KeccakHasher::new();
        hasher.update(&self.type_hash());
        for (_, value) in &self.fields {
            hasher.update(&value.encode_word());
        }
        hasher.finalize()
    }
}

/// Signing domain.
///
/// Only the fields that are set take part in the domain type, in the
/// canonical order `name, version, chainId, verifyingContract, salt`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Eip712Domain {
    /// Human-readable signing context name.
    pub name: Option<String>,
    /// Protocol version.
    pub version: Option<String>,
    /// Chain the signature is valid on.
    pub chain_id: Option<U256>,
    /// Contract the signature is bound to.
    pub verifying_contract: Option<Address>,
    /// Extra disambiguation.
    pub salt: Option<[u8; 32]>,
}

impl Eip712Domain {
    /// Domain with a name and version only.
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            version: Some(version.into()),
            ..Self::default()
        }
    }

    /// Bind to a chain.
    #[must_use]
    pub fn with_chain_id(mut self, chain_id: u64) -> Self {
        self.chain_id = Some(U256::from(chain_id));
        self
    }

    /// Bind to a contract.
    #[must_use]
    pub fn with_verifying_contract(mut self, contract: Address) -> Self {
        self.verifying_contract = Some(contract);
        self
    }

    /// Add a salt.
    #[must_use]
    pub fn with_salt(mut self, salt: [u8; 32]) -> Self {
        self.salt = Some(salt);
        self
    }

    /// The domain as an `EIP712Domain` typed struct.
    #[must_use]
    pub fn to_typed_struct(&self) -> TypedStruct {
        let mut s = TypedStruct::new("EIP712Domain");
        if let Some(name) = &self.name {
            s = s.field("name", TypedValue::String(name.clone()));
        }
        if let Some(version) = &self.version {
            s = s.field("version", TypedValue::String(version.clone()));
        }
        if let Some(chain_id) = self.chain_id {
            s = s.field("chainId", TypedValue::Uint(chain_id));
        }
        if let Some(contract) = self.verifying_contract {
            s = s.field("verifyingContract", TypedValue::Address(contract));
        }
        if let Some(salt) = self.salt {
            s = s.field("salt", TypedValue::FixedBytes(salt));
        }
        s
    }

    /// `hashStruct(domain)`.
    #[must_use]
    pub fn separator(&self) -> Hash {
        self.to_typed_struct().hash_struct()
    }
}

/// Final digest that gets signed.
#[must_use]
pub fn typed_data_digest(domain: &Eip712Domain, message: &TypedStruct) -> Hash {
    let mut hasher = KeccakHasher::new();
    hasher.update(&[0x19, 0x01]);
    hasher.update(&domain.separator());
    hasher.update(&message.hash_struct());
    hasher.finalize()
}
