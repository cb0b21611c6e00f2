//! Script execution receipts.
//!
//! Every run through the [`Executor`](crate::core::executor::Executor) yields a
//! [`Receipt`], whether the script halted or faulted. Receipts are canonically
//! encoded so their hashes can be compared across nodes.

use crate::types::hash::Hash;
use crate::virtual_machine::object::VMObject;
use chainvm_derive::BinaryCodec;

/// Record of a single script execution.
#[derive(Clone, Debug, PartialEq, Eq, BinaryCodec)]
pub struct Receipt {
    /// SHA3-256 of the executed code.
    pub script_hash: Hash,
    /// True when the script halted cleanly and its storage writes were committed.
    pub success: bool,
    /// Gas charged for the instructions that executed. An instruction refused
    /// for lack of gas adds nothing.
    pub gas_used: u64,
    /// Rendered fault, if the run faulted.
    pub fault: Option<String>,
    /// Top of the operand stack at the end of the run.
    pub result: Option<VMObject>,
    /// Objects emitted through `Runtime.Notify`. Empty when the run faulted.
    pub events: Vec<VMObject>,
}

impl Receipt {
    /// Domain-separated hash of the encoded receipt.
    pub fn hash(&self) -> Hash {
        Hash::tagged(b"RECEIPT", self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::encoding::{Decode, Encode};

    fn sample_receipt() -> Receipt {
        Receipt {
            script_hash: Hash::digest(b"script"),
            success: true,
            gas_used: 21,
            fault: None,
            result: Some(VMObject::from("HELLO".to_string())),
            events: vec![VMObject::from(7i64)],
        }
    }

    #[test]
    fn receipt_decodes_to_itself() {
        let receipt = sample_receipt();
        let decoded = Receipt::from_bytes(receipt.to_bytes().as_slice()).expect("decode failed");
        assert_eq!(receipt, decoded);
    }

    #[test]
    fn receipt_hash_is_domain_separated() {
        let receipt = sample_receipt();
        let mut h = Hash::sha3();
        receipt.encode(&mut h);
        assert_ne!(receipt.hash(), h.finalize());
        assert_eq!(receipt.hash(), sample_receipt().hash());
    }

    #[test]
    fn every_field_feeds_the_hash() {
        let base = sample_receipt();
        let mut variants = vec![base.clone(); 5];
        variants[0].success = false;
        variants[1].gas_used = 22;
        variants[2].fault = Some("out of gas".into());
        variants[3].result = None;
        variants[4].events.clear();

        for variant in &variants {
            assert_ne!(variant.hash(), base.hash());
        }
    }
}
