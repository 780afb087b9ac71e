use crate::internal::kfrag::KFragId;

use openssl::error::ErrorStack;
use quick_error::quick_error;

quick_error! {
    #[derive(Debug, Clone, PartialEq)]
    pub enum PreErrors {
        EncryptionError {
            display("Encryption error")
        }
        DecryptionError {
            display("Decryption error")
        }
        DerivationError {
            display("Key Derivation error")
        }
        InvalidThreshold(threshold: usize, shares: usize) {
            display("Threshold {} is not valid for {} shares", threshold, shares)
        }
        KeysParametersNotEq {
            display("Keys parameters are not the same")
        }
        InvalidCapsule {
            display("The capsule is not valid")
        }
        InvalidFragment(reason: &'static str) {
            display("The fragment is not valid: {}", reason)
        }
        InsufficientFragments(needed: usize, received: usize) {
            display("At least {} fragments are needed, {} were provided", needed, received)
        }
        DuplicateFragment(id: KFragId) {
            display("Fragment {} was provided more than once", id)
        }
        InvalidBytes {
            display("The bytes given in input are not valid")
        }
        HashToPointError {
            display("No curve point found for the given input")
        }
        Backend(reason: String) {
            from(err: ErrorStack) -> (err.to_string())
            display("OpenSSL error: {}", reason)
        }
    }
}
