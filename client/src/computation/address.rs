use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// 32-byte resource address on the ledger.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct Address(pub [u8; 32]);

impl Address {
    pub fn from_hex(value: &str) -> Option<Self> {
        let value = value.strip_prefix("0x").unwrap_or(value);
        let bytes = hex::decode(value).ok()?;
        Some(Self(bytes.try_into().ok()?))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({self})")
    }
}

impl From<Address> for String {
    fn from(address: Address) -> Self {
        address.to_string()
    }
}

impl TryFrom<String> for Address {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::from_hex(&value).ok_or_else(|| format!("invalid address: {value}"))
    }
}

/// Every address needed to route one computation request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestAddresses {
    pub mxe: Address,
    pub mempool: Address,
    pub executing_pool: Address,
    pub cluster: Address,
    pub definition: Address,
    pub computation: Address,
}

/// Derives request addresses from fixed network identifiers and a request offset.
pub trait Addressing: Clone + Send + Sync + 'static {
    /// Addresses for the request identified by `offset`. Pure and deterministic.
    fn derive(&self, offset: u64) -> RequestAddresses;
}

/// Hash-based derivation from the program id, cluster offset and computation definition name.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProgramAddressing {
    program_id: [u8; 32],
    cluster_offset: u32,
    definition: String,
}

impl ProgramAddressing {
    pub fn new(program_id: [u8; 32], cluster_offset: u32, definition: String) -> Self {
        Self {
            program_id,
            cluster_offset,
            definition,
        }
    }

    fn seeded(&self, label: &[u8], extra: &[u8]) -> Address {
        let mut hasher = Sha256::new();
        hasher.update(label);
        hasher.update(self.program_id);
        hasher.update(extra);
        Address(hasher.finalize().into())
    }
}

impl Addressing for ProgramAddressing {
    fn derive(&self, offset: u64) -> RequestAddresses {
        let cluster = self.cluster_offset.to_le_bytes();
        let mut computation_seed = cluster.to_vec();
        computation_seed.extend_from_slice(&offset.to_le_bytes());
        RequestAddresses {
            mxe: self.seeded(b"MXEAccount", &[]),
            mempool: self.seeded(b"Mempool", &cluster),
            executing_pool: self.seeded(b"Execpool", &cluster),
            cluster: self.seeded(b"Cluster", &cluster),
            definition: self.seeded(b"ComputationDefinitionAccount", self.definition.as_bytes()),
            computation: self.seeded(b"ComputationAccount", &computation_seed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addressing() -> ProgramAddressing {
        ProgramAddressing::new([7u8; 32], 1, "spin_wheel".to_string())
    }

    #[test]
    fn derivation_is_deterministic() {
        assert_eq!(addressing().derive(42), addressing().derive(42));
    }

    #[test]
    fn only_computation_address_depends_on_offset() {
        let a = addressing().derive(1);
        let b = addressing().derive(2);
        assert_ne!(a.computation, b.computation);
        assert_eq!(a.mxe, b.mxe);
        assert_eq!(a.definition, b.definition);
        assert_eq!(a.mempool, b.mempool);
    }

    #[test]
    fn hex_round_trip() {
        let address = addressing().derive(9).computation;
        let json = serde_json::to_string(&address).unwrap();
        assert_eq!(json, format!("\"{address}\""));
        assert_eq!(Address::from_hex(&format!("0x{address}")), Some(address));
        assert_eq!(Address::from_hex("abcd"), None);
    }
}
