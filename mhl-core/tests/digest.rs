use mhl_core::digest::{Digest, DigestEngine, HashType, StreamDigester};
use mhl_core::error::ErrorKind;

fn file_with(content: &[u8]) -> (tempfile::TempDir, std::path::PathBuf) {
    let td = tempfile::tempdir().unwrap();
    let p = td.path().join("data.bin");
    std::fs::write(&p, content).unwrap();
    (td, p)
}

#[test]
fn known_vectors_in_one_pass() {
    let (_td, p) = file_with(b"abc");
    let engine = StreamDigester::new();
    let out = engine.compute_many(&p, &[HashType::Md5, HashType::Sha1]).unwrap();
    assert_eq!(out.len(), 2);
    assert_eq!(out[0].to_hex(), "900150983cd24fb0d6963f7d28e17f72");
    assert_eq!(out[1].to_hex(), "a9993e364706816aba3e25717850c26c9cd0d89d");
}

#[test]
fn xxhash_renderings() {
    let (_td, p) = file_with(b"");
    let engine = StreamDigester::new();
    let xx32 = engine.compute(&p, HashType::XxHash32).unwrap();
    let xx64 = engine.compute(&p, HashType::XxHash64).unwrap();
    let xx64be = engine.compute(&p, HashType::XxHash64BE).unwrap();
    assert_eq!(xx32.to_hex(), "0046947589");
    assert_eq!(xx64be.to_hex(), "ef46db3751d8e999");
    assert_eq!(xx64.to_hex(), "99e9d85137db46ef");
    for d in [xx32, xx64, xx64be] {
        assert_eq!(d.to_hex().len(), d.hash_type().expected_len());
    }
}

#[test]
fn small_buffers_give_same_digests() {
    let data: Vec<u8> = (0..10_000u32).map(|i| (i * 7 % 251) as u8).collect();
    let (_td, p) = file_with(&data);
    let types = [HashType::Sha1, HashType::Md5, HashType::XxHash32, HashType::XxHash64];
    let big = StreamDigester::new().compute_many(&p, &types).unwrap();
    let small = StreamDigester::new().with_buffer_size(7).compute_many(&p, &types).unwrap();
    assert_eq!(big, small);
    assert_eq!(big, StreamDigester::digest_bytes(&data, &types));
}

#[test]
fn matching_is_case_insensitive_and_length_exact() {
    let d = Digest::Md5([0xab; 16]);
    assert!(d.matches(&"AB".repeat(16)));
    assert!(!d.matches(&"ab".repeat(15)));
    assert!(!d.matches(&format!("{}0", "ab".repeat(16))));
}

#[test]
fn null_and_missing_files() {
    let engine = StreamDigester::new();
    let (_td, p) = file_with(b"x");
    assert_eq!(engine.compute(&p, HashType::Null).unwrap_err().kind(), ErrorKind::InternalError);
    assert!(engine.compute_many(&p, &[HashType::Null]).unwrap().is_empty());

    let missing = p.with_file_name("nope.bin");
    assert_eq!(engine.compute(&missing, HashType::Md5).unwrap_err().kind(), ErrorKind::NoSuchFile);
}

#[test]
fn names_and_canonical_order() {
    assert_eq!(HashType::from_tag("xxhash"), Some(HashType::XxHash32));
    assert_eq!(HashType::from_tag("XXHASH"), None);
    assert_eq!(HashType::from_label("xxHash64BE"), Some(HashType::XxHash64BE));
    assert_eq!("SHA1".parse::<HashType>().unwrap(), HashType::Sha1);
    assert_eq!("crc".parse::<HashType>().unwrap_err().kind(), ErrorKind::UnsupportedHashEncoding);

    let mut types = vec![HashType::XxHash64BE, HashType::Md5, HashType::XxHash32, HashType::Sha1];
    types.sort();
    assert_eq!(types, [HashType::Sha1, HashType::Md5, HashType::XxHash32, HashType::XxHash64BE]);
}
