//! Property tests: bytes written through the contract read back identically
//! after close and reopen.

use dbvfs::*;
use proptest::prelude::*;
use tempfile::tempdir;

#[derive(Debug, Clone)]
enum Op {
    Write { offset: u64, data: Vec<u8> },
    Truncate { size: u64 },
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        4 => (0u64..16_384, prop::collection::vec(any::<u8>(), 1..600))
            .prop_map(|(offset, data)| Op::Write { offset, data }),
        1 => (0u64..20_000).prop_map(|size| Op::Truncate { size }),
    ]
}

/// Reference model of a file: a plain byte vector.
fn apply(model: &mut Vec<u8>, op: &Op) {
    match op {
        Op::Write { offset, data } => {
            let start = *offset as usize;
            let end = start + data.len();
            if model.len() < end {
                model.resize(end, 0);
            }
            model[start..end].copy_from_slice(data);
        }
        Op::Truncate { size } => model.resize(*size as usize, 0),
    }
}

fn run(file: &dyn VfsFile, op: &Op) {
    match op {
        Op::Write { offset, data } => file.write_all_at(data, *offset).unwrap(),
        Op::Truncate { size } => file.truncate(*size).unwrap(),
    }
}

fn read_all(file: &dyn VfsFile) -> Vec<u8> {
    let size = file.file_size().unwrap() as usize;
    let mut buf = vec![0u8; size];
    let outcome = file.read_exact_at(&mut buf, 0).unwrap();
    assert_eq!(outcome, ReadOutcome::Full);
    buf
}

fn check_roundtrip(vfs: &dyn Vfs, ops: &[Op]) -> Result<(), TestCaseError> {
    let mut model = Vec::new();
    let (file, _) = vfs.open(Some("prop.db"), OpenFlags::main_db()).unwrap();
    file.lock(LockLevel::Exclusive).unwrap();
    for op in ops {
        run(file.as_ref(), op);
        apply(&mut model, op);
    }
    file.sync(SyncLevel::Full).unwrap();
    file.close().unwrap();

    let (file, _) = vfs.open(Some("prop.db"), OpenFlags::READ_ONLY).unwrap();
    prop_assert_eq!(file.file_size().unwrap(), model.len() as u64);
    prop_assert_eq!(read_all(file.as_ref()), model);
    file.close().unwrap();
    Ok(())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn dir_backend_roundtrips(ops in prop::collection::vec(op_strategy(), 1..24)) {
        let dir = tempdir().unwrap();
        let vfs = DirVfs::new(dir.path()).unwrap();
        check_roundtrip(&vfs, &ops)?;
    }

    #[test]
    fn memory_backend_roundtrips(ops in prop::collection::vec(op_strategy(), 1..24)) {
        let vfs = MemoryVfs::new();
        check_roundtrip(&vfs, &ops)?;
    }

    #[test]
    fn checked_layer_is_transparent(ops in prop::collection::vec(op_strategy(), 1..12)) {
        let vfs = MemoryVfs::new().layer(CheckedLayer::new());
        check_roundtrip(&vfs, &ops)?;
    }

    #[test]
    fn unaligned_reads_match_model(
        data in prop::collection::vec(any::<u8>(), 0..2048),
        offset in 0u64..3000,
        len in 0usize..700,
    ) {
        let vfs = MemoryVfs::new();
        let (file, _) = vfs.open(Some("slice.db"), OpenFlags::main_db()).unwrap();
        file.write_all_at(&data, 0).unwrap();

        let mut buf = vec![0xa5u8; len];
        let outcome = file.read_exact_at(&mut buf, offset).unwrap();

        let start = (offset as usize).min(data.len());
        let end = (offset as usize + len).min(data.len());
        let available = end - start;
        let mut expected = data[start..end].to_vec();
        expected.resize(len, 0);

        prop_assert_eq!(&buf, &expected);
        if available == len {
            prop_assert_eq!(outcome, ReadOutcome::Full);
        } else {
            prop_assert_eq!(outcome, ReadOutcome::Short { read: available });
        }
    }
}
