//! File-backed split/merge through the member directory

use std::path::Path;
use tempfile::TempDir;
use tristripe::config::Config;
use tristripe::crypto::{CipherKey, Digest};
use tristripe::error::code;
use tristripe::fs::{self, MemberSet};
use tristripe::raid::{ArrayStatus, Member, MemberStatus};
use tristripe::Error;

struct Fixture {
    dir: TempDir,
    config: Config,
}

impl Fixture {
    fn new(block_size: usize) -> Self {
        let dir = TempDir::new().unwrap();
        let mut config = Config::default();
        config.raid.block_size = block_size;
        config.storage.member_dir = dir.path().join("members");
        Fixture { dir, config }
    }

    fn write_input(&self, name: &str, data: &[u8]) -> std::path::PathBuf {
        let path = self.dir.path().join(name);
        std::fs::write(&path, data).unwrap();
        path
    }

    fn output(&self, name: &str) -> std::path::PathBuf {
        self.dir.path().join(name)
    }
}

fn sample(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 7 + i / 251) as u8).collect()
}

fn read(path: &Path) -> Vec<u8> {
    std::fs::read(path).unwrap()
}

#[test]
fn test_split_creates_layout() {
    let fx = Fixture::new(4);
    let input = fx.write_input("letters.txt", b"ABCDEFGHIJ");

    let (set, record) = fs::split_file(&fx.config, &input, None, None).unwrap();
    assert_eq!(set.base(), Digest::of(b"letters.txt").to_hex());

    for member in Member::ALL {
        assert!(set.member_path(member).is_file());
    }
    let persisted = std::fs::read_to_string(set.metadata_path()).unwrap();
    assert_eq!(persisted, record.encode().unwrap());
    assert_eq!(record.missing, 2);

    assert_eq!(read(&set.member_path(Member::Member1)), b"EFGHIJ");
}

#[test]
fn test_roundtrip_and_single_loss() {
    let fx = Fixture::new(64);
    let data = sample(10_000);
    let input = fx.write_input("data.bin", &data);
    let (set, _) = fs::split_file(&fx.config, &input, Some("logical"), None).unwrap();

    let out = fx.output("intact.bin");
    let report = fs::merge_file(&fx.config, set.base(), &out, None).unwrap();
    assert_eq!(read(&out), data);
    assert_eq!(report.failed_member, None);
    assert_eq!(report.bytes_written, data.len() as u64);

    for member in Member::ALL {
        let path = set.member_path(member);
        let saved = read(&path);
        std::fs::remove_file(&path).unwrap();

        let out = fx.output(&format!("without_{}.bin", member.index()));
        let report = fs::merge_file(&fx.config, set.base(), &out, None).unwrap();
        assert_eq!(read(&out), data, "without {}", member);
        assert_eq!(report.failed_member, Some(member));

        std::fs::write(&path, saved).unwrap();
    }
}

#[test]
fn test_corrupted_member_reported_and_recovered() {
    let fx = Fixture::new(16);
    let data = sample(1000);
    let input = fx.write_input("data.bin", &data);
    let (set, _) = fs::split_file(&fx.config, &input, None, None).unwrap();

    let path = set.member_path(Member::Member0);
    let mut bytes = read(&path);
    bytes[100] ^= 0xFF;
    std::fs::write(&path, bytes).unwrap();

    let health = fs::verify(&fx.config, set.base()).unwrap();
    assert_eq!(health.status, ArrayStatus::Degraded);
    assert_eq!(health.member(Member::Member0).status, MemberStatus::Corrupted);

    let out = fx.output("out.bin");
    let report = fs::merge_file(&fx.config, set.base(), &out, None).unwrap();
    assert_eq!(report.failed_member, Some(Member::Member0));
    assert_eq!(read(&out), data);
}

#[test]
fn test_two_members_lost() {
    let fx = Fixture::new(16);
    let input = fx.write_input("data.bin", &sample(500));
    let (set, _) = fs::split_file(&fx.config, &input, None, None).unwrap();

    std::fs::remove_file(set.member_path(Member::Member0)).unwrap();
    std::fs::remove_file(set.member_path(Member::Member2)).unwrap();

    let health = fs::verify(&fx.config, set.base()).unwrap();
    assert_eq!(health.status, ArrayStatus::Failed);
    assert_eq!(health.member(Member::Member2).status, MemberStatus::Missing);

    let err = fs::merge_file(&fx.config, set.base(), &fx.output("out.bin"), None).unwrap_err();
    assert!(matches!(err, Error::MetadataMismatch(_)));
    assert_eq!(err.code(), code::METADATA_ERROR);
}

#[test]
fn test_encrypted_file_roundtrip() {
    let fx = Fixture::new(32);
    let data = sample(3333);
    let input = fx.write_input("secret.bin", &data);
    let key = CipherKey::from_passphrase(b"correct horse").unwrap();

    let (set, record) = fs::split_file(&fx.config, &input, None, Some(&key)).unwrap();
    assert_ne!(record.original, Digest::of(&data));

    std::fs::remove_file(set.member_path(Member::Member1)).unwrap();
    let out = fx.output("out.bin");
    fs::merge_file(&fx.config, set.base(), &out, Some(&key)).unwrap();
    assert_eq!(read(&out), data);
}

#[test]
fn test_encryption_disabled_ignores_key() {
    let mut fx = Fixture::new(32);
    fx.config.encryption.enabled = false;
    let data = sample(300);
    let input = fx.write_input("plain.bin", &data);
    let key = CipherKey::from_passphrase(b"unused").unwrap();

    let (set, record) = fs::split_file(&fx.config, &input, None, Some(&key)).unwrap();
    assert_eq!(record.original, Digest::of(&data));

    let out = fx.output("out.bin");
    fs::merge_file(&fx.config, set.base(), &out, None).unwrap();
    assert_eq!(read(&out), data);
}

#[test]
fn test_empty_input() {
    let fx = Fixture::new(8);
    let input = fx.write_input("empty", b"");
    let (set, record) = fs::split_file(&fx.config, &input, None, None).unwrap();
    assert_eq!(record.missing, 0);
    assert_eq!(record.original, Digest::of(b""));

    let out = fx.output("out.bin");
    let report = fs::merge_file(&fx.config, set.base(), &out, None).unwrap();
    assert_eq!(report.rounds, 0);
    assert!(read(&out).is_empty());
}

#[test]
fn test_inspect_matches_split() {
    let fx = Fixture::new(8);
    let input = fx.write_input("x", &sample(77));
    let (set, record) = fs::split_file(&fx.config, &input, None, None).unwrap();

    let inspected = fs::inspect(&fx.config, set.base()).unwrap();
    assert_eq!(inspected, record);
    assert!(inspected.to_string().contains(&record.original.to_hex()));
}

#[test]
fn test_open_errors() {
    let fx = Fixture::new(8);

    let err = fs::split_file(&fx.config, &fx.output("absent"), None, None).unwrap_err();
    assert_eq!(err.code(), code::OPENERR_IN);

    let err = fs::merge_file(&fx.config, "nothing-here", &fx.output("o"), None).unwrap_err();
    assert!(err.is_metadata());

    let input = fx.write_input("in", &sample(20));
    let (set, _) = fs::split_file(&fx.config, &input, None, None).unwrap();
    let bad_output = fx.dir.path().join("no").join("such").join("dir");
    let err = fs::merge_file(&fx.config, set.base(), &bad_output, None).unwrap_err();
    assert_eq!(err.code(), code::OPENERR_OUT);
}

#[test]
fn test_resplit_overwrites_set() {
    let fx = Fixture::new(8);
    let first = fx.write_input("first", &sample(100));
    let second = fx.write_input("second", b"short");

    let (set, _) = fs::split_file(&fx.config, &first, Some("same"), None).unwrap();
    let (again, _) = fs::split_file(&fx.config, &second, Some("same"), None).unwrap();
    assert_eq!(set, again);

    let out = fx.output("out");
    fs::merge_file(&fx.config, set.base(), &out, None).unwrap();
    assert_eq!(read(&out), b"short");
}

#[test]
fn test_member_set_from_base() {
    let fx = Fixture::new(8);
    let named = MemberSet::for_name(&fx.config.storage.member_dir, "a name");
    let parsed = MemberSet::from_base(&fx.config.storage.member_dir, named.base()).unwrap();
    assert_eq!(named, parsed);
}
