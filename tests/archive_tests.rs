mod common;

use chmarc::{Archive, ArchiveOptions, EnumerateSignal, SliceSource, ENUMERATE_ALL};
use common::{build_archive, FixtureEntry};

fn open(entries: &[FixtureEntry]) -> Archive {
    let bytes = build_archive(entries);
    Archive::open_source(Box::new(SliceSource::new(bytes)), &ArchiveOptions::default()).unwrap()
}

fn sample_fixture() -> Vec<FixtureEntry> {
    vec![
        FixtureEntry {
            path: "/",
            content: None,
        },
        FixtureEntry {
            path: "/index.html",
            content: Some(b"<html>hello world</html>".to_vec()),
        },
        FixtureEntry {
            path: "/#SYSTEM",
            content: Some(vec![1, 2, 3, 4]),
        },
        FixtureEntry {
            path: "::DataSpace/NameList",
            content: Some(vec![9, 9]),
        },
    ]
}

#[test]
fn truncated_archive_open_fails_cleanly() {
    let data = vec![0u8; 0x20];
    let result = Archive::open_source(Box::new(SliceSource::new(data)), &ArchiveOptions::default());
    assert!(result.is_err());
}

#[test]
fn compression_disabled_without_meta_units() {
    let archive = open(&sample_fixture());
    assert!(!archive.compression_enabled());
}

#[test]
fn resolve_root_has_dirs_flag_and_zero_length() {
    let archive = open(&sample_fixture());
    let root = archive.resolve("/").unwrap().expect("root entry present");
    assert_eq!(root.path, "/");
    assert_eq!(root.length, 0);
    assert!(root.flags.contains(chmarc::EntryFlags::DIRS));
    assert!(!root.flags.contains(chmarc::EntryFlags::FILES));
}

#[test]
fn resolve_is_case_insensitive_and_idempotent() {
    let archive = open(&sample_fixture());
    let a = archive.resolve("/INDEX.HTML").unwrap().unwrap();
    let b = archive.resolve(&a.path).unwrap().unwrap();
    assert_eq!(a.path, b.path);
    assert_eq!(a.start, b.start);
}

#[test]
fn resolve_absent_path_returns_none_without_error() {
    let archive = open(&sample_fixture());
    assert!(archive.resolve("/does/not/exist").unwrap().is_none());
}

#[test]
fn enumerate_all_finds_special_and_meta_entries() {
    let archive = open(&sample_fixture());
    let mut saw_special = false;
    let mut saw_meta = false;
    archive
        .enumerate(ENUMERATE_ALL, |entry| {
            if entry.path.starts_with("/#") {
                saw_special = true;
            }
            if entry.path.starts_with("::") {
                saw_meta = true;
            }
            EnumerateSignal::Continue
        })
        .unwrap();
    assert!(saw_special);
    assert!(saw_meta);
}

#[test]
fn enumeration_and_resolve_agree() {
    let archive = open(&sample_fixture());
    let mut checked = 0;
    archive
        .enumerate(ENUMERATE_ALL, |entry| {
            let resolved = archive.resolve(&entry.path).unwrap().unwrap();
            assert_eq!(resolved.path, entry.path);
            assert_eq!(resolved.start, entry.start);
            assert_eq!(resolved.length, entry.length);
            checked += 1;
            EnumerateSignal::Continue
        })
        .unwrap();
    assert_eq!(checked, sample_fixture().len());
}

#[test]
fn enumerate_success_signal_stops_early_and_reports_ok() {
    let archive = open(&sample_fixture());
    let mut seen = 0;
    let ok = archive
        .enumerate(ENUMERATE_ALL, |_entry| {
            seen += 1;
            EnumerateSignal::Success
        })
        .unwrap();
    assert!(ok);
    assert_eq!(seen, 1);
}

#[test]
fn enumerate_failure_signal_stops_early_and_reports_failure() {
    let archive = open(&sample_fixture());
    let ok = archive
        .enumerate(ENUMERATE_ALL, |_entry| EnumerateSignal::Failure)
        .unwrap();
    assert!(!ok);
}

#[test]
fn read_length_law_full_entry_read_returns_exact_length() {
    let mut archive = open(&sample_fixture());
    let entry = archive.resolve("/index.html").unwrap().unwrap();
    let mut buf = vec![0u8; entry.length as usize];
    let n = archive.retrieve(&entry, 0, &mut buf).unwrap();
    assert_eq!(n, entry.length as usize);
    assert_eq!(&buf, b"<html>hello world</html>");
}

#[test]
fn random_access_equivalence() {
    let mut archive = open(&sample_fixture());
    let entry = archive.resolve("/index.html").unwrap().unwrap();
    let mut full = vec![0u8; entry.length as usize];
    archive.retrieve(&entry, 0, &mut full).unwrap();

    for (a, l) in [(0u64, 5usize), (3, 10), (20, 4), (24, 1)] {
        let mut partial = vec![0u8; l];
        let n = archive.retrieve(&entry, a, &mut partial).unwrap();
        partial.truncate(n);
        assert_eq!(&partial[..], &full[a as usize..a as usize + n]);
    }
}

#[test]
fn addr_at_length_returns_zero_bytes() {
    let mut archive = open(&sample_fixture());
    let entry = archive.resolve("/#SYSTEM").unwrap().unwrap();
    let mut buf = vec![0u8; 8];
    let n = archive.retrieve(&entry, entry.length, &mut buf).unwrap();
    assert_eq!(n, 0);
}

#[test]
fn addr_plus_len_beyond_length_is_clipped() {
    let mut archive = open(&sample_fixture());
    let entry = archive.resolve("/#SYSTEM").unwrap().unwrap();
    let mut buf = vec![0u8; 100];
    let n = archive.retrieve(&entry, 1, &mut buf).unwrap();
    assert_eq!(n, (entry.length - 1) as usize);
}

#[test]
fn flag_derivation_matches_path_shape() {
    let archive = open(&sample_fixture());
    let file = archive.resolve("/index.html").unwrap().unwrap();
    assert!(file.flags.contains(chmarc::EntryFlags::NORMAL | chmarc::EntryFlags::FILES));

    let dir = archive.resolve("/").unwrap().unwrap();
    assert!(dir.flags.contains(chmarc::EntryFlags::DIRS));
    assert!(!dir.flags.contains(chmarc::EntryFlags::FILES));

    let special = archive.resolve("/#SYSTEM").unwrap().unwrap();
    assert!(special.flags.contains(chmarc::EntryFlags::SPECIAL));
    assert!(special.flags.contains(chmarc::EntryFlags::FILES));

    let meta = archive.resolve("::DataSpace/NameList").unwrap().unwrap();
    assert!(meta.flags.contains(chmarc::EntryFlags::META));
    assert!(meta.flags.contains(chmarc::EntryFlags::FILES));
}

#[test]
fn entries_surface_is_cached_across_calls() {
    let mut archive = open(&sample_fixture());
    let first_len = archive.entries().unwrap().len();
    let second_len = archive.entries().unwrap().len();
    assert_eq!(first_len, second_len);
    assert_eq!(first_len, sample_fixture().len());
}

#[test]
fn cache_size_changes_do_not_affect_uncompressed_reads() {
    let mut archive = open(&sample_fixture());
    let entry = archive.resolve("/index.html").unwrap().unwrap();
    for size in [1usize, 16, 5] {
        archive.set_cache_size(size);
        let mut buf = vec![0u8; entry.length as usize];
        archive.retrieve(&entry, 0, &mut buf).unwrap();
        assert_eq!(&buf, b"<html>hello world</html>");
    }
}
