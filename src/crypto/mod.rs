pub mod key_management;
pub mod signatures;

pub use key_management::{KeyStatus, KeyStore, NewSigningKey};
pub use signatures::{signer_from_config, RecordSigner, Secp256k1Signer, SimulatedSigner};
