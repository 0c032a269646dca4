//! Property-based tests for catalog consistency
//!
//! Drives a vault with random operation sequences against an in-memory
//! model and verifies the catalog invariants plus data integrity after
//! every step.

use proptest::prelude::*;
use std::collections::HashMap;
use tempfile::TempDir;
use vault::{Catalog, Vault, VaultError};

#[derive(Debug, Clone)]
enum Op {
    /// Add a file of the given size filled with the given byte.
    Add(usize, u8),
    /// Remove the n-th live file (modulo the live count).
    Remove(usize),
    Defrag,
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => (0usize..3000, any::<u8>()).prop_map(|(size, byte)| Op::Add(size, byte)),
        2 => (0usize..100).prop_map(Op::Remove),
        1 => Just(Op::Defrag),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_catalog_valid_and_data_intact(ops in prop::collection::vec(op_strategy(), 1..40)) {
        let dir = TempDir::new().unwrap();
        let vault_path = dir.path().join("prop.vlt");
        Vault::init(&vault_path, Catalog::data_start() + 32 * 1024).unwrap();

        let mut vault = Vault::open(&vault_path).unwrap();
        let mut model: HashMap<String, Vec<u8>> = HashMap::new();
        let mut serial = 0usize;

        for op in &ops {
            match op {
                Op::Add(size, byte) => {
                    let name = format!("file-{:03}", serial);
                    serial += 1;
                    let data = vec![*byte; *size];
                    let src = dir.path().join(&name);
                    std::fs::write(&src, &data).unwrap();

                    match vault.add(&src) {
                        Ok(stored) => {
                            prop_assert_eq!(&stored, &name);
                            model.insert(name, data);
                        }
                        // The only acceptable failures for a fresh name
                        Err(VaultError::CapacityExceeded(_)) | Err(VaultError::TableFull) => {}
                        Err(other) => prop_assert!(false, "unexpected add failure: {}", other),
                    }
                }
                Op::Remove(pick) => {
                    let mut names: Vec<String> = model.keys().cloned().collect();
                    names.sort();
                    if names.is_empty() {
                        continue;
                    }
                    let name = &names[pick % names.len()];
                    vault.remove(name).unwrap();
                    model.remove(name);
                }
                Op::Defrag => {
                    vault.defragment().unwrap();
                }
            }

            let check = vault.catalog().validate();
            prop_assert!(check.is_ok(), "catalog invalid after {:?}: {:?}", op, check);
            prop_assert_eq!(vault.catalog().files.len(), model.len());
        }

        // Every surviving file fetches back byte for byte, including
        // after a close/reopen cycle.
        vault.close().unwrap();
        let mut vault = Vault::open(&vault_path).unwrap();
        for (name, data) in &model {
            let dest = dir.path().join(format!("{}.out", name));
            vault.fetch_into(name, &dest).unwrap();
            prop_assert_eq!(&std::fs::read(&dest).unwrap(), data);
        }
    }

    #[test]
    fn prop_defrag_preserves_contents(sizes in prop::collection::vec(1usize..2000, 1..12)) {
        let dir = TempDir::new().unwrap();
        let vault_path = dir.path().join("defrag.vlt");
        Vault::init(&vault_path, Catalog::data_start() + 64 * 1024).unwrap();

        let mut vault = Vault::open(&vault_path).unwrap();
        let mut model = Vec::new();
        for (i, size) in sizes.iter().enumerate() {
            let name = format!("f{}", i);
            let data: Vec<u8> = (0..*size).map(|j| (i + j) as u8).collect();
            let src = dir.path().join(&name);
            std::fs::write(&src, &data).unwrap();
            vault.add(&src).unwrap();
            model.push((name, data));
        }

        // Punch holes, then compact
        for (name, _) in model.iter().step_by(2) {
            vault.remove(name).unwrap();
        }
        let survivors: Vec<_> = model.iter().skip(1).step_by(2).collect();
        vault.defragment().unwrap();

        let mut cursor = Catalog::data_start();
        for block in &vault.catalog().blocks {
            prop_assert_eq!(block.offset, cursor);
            cursor += block.length;
        }
        vault.catalog().validate().unwrap();

        for (name, data) in &survivors {
            let dest = dir.path().join(format!("{}.out", name));
            vault.fetch_into(name, &dest).unwrap();
            prop_assert_eq!(&std::fs::read(&dest).unwrap(), data);
        }
    }
}
