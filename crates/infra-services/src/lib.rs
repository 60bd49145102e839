// Fatura Infrastructure - Outbound Service Adapters
// Implements: ObjectStore, ParseService, CredentialVerifier

pub mod http_parse_service;
pub mod jwt_verifier;
pub mod local_object_store;

pub use http_parse_service::{HttpParseService, ParserConfig};
pub use jwt_verifier::JwtCredentialVerifier;
pub use local_object_store::{LocalObjectStore, LocalStoreConfig, METADATA_SUFFIX};
