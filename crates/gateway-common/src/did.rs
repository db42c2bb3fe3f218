/// The identity a request carries once the DID auth header has been verified.
///
/// Verification itself (signature checking against the DID document) is an
/// external collaborator's job; this crate only carries the result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DidInfo {
    pub did: String,
    pub key_id: String,
}
