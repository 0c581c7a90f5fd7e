use dirdb::{CacheStoreStrategy, Error, MergeOutcome, MergingDirDb, MergingDirDbJson};
use std::fs::{self, File};
use std::path::Path;
use std::time::{Duration, SystemTime};
use tempfile::TempDir;

type Key = (String, String);
type Store = MergingDirDb<Key, f64>;

fn run(number: &str) -> Key {
    ("run".to_string(), number.to_string())
}

fn backdate(path: &Path, seconds: u64) {
    File::options()
        .write(true)
        .open(path)
        .unwrap()
        .set_modified(SystemTime::now() - Duration::from_secs(seconds))
        .unwrap();
}

fn file_names(directory: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(directory)
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

#[test]
fn round_trip_within_and_across_sessions() {
    let temp_dir = TempDir::new().unwrap();
    let mut writer = Store::open(temp_dir.path()).unwrap();

    writer.add(run("1"), 0.5, false).unwrap();
    assert_eq!(writer.get(&run("1")).unwrap(), Some(0.5));
    drop(writer);

    let reader = Store::open(temp_dir.path()).unwrap();
    assert_eq!(reader.get(&run("1")).unwrap(), Some(0.5));
    assert_eq!(reader.get(&run("2")).unwrap(), None);
}

#[test]
fn first_writer_wins_without_overwrite() {
    let temp_dir = TempDir::new().unwrap();
    let mut first = Store::open(temp_dir.path()).unwrap();
    let mut second = Store::open(temp_dir.path()).unwrap();

    first.add(run("1"), 1.0, false).unwrap();
    let returned = second.add(run("1"), 2.0, false).unwrap();

    assert_eq!(returned, 1.0);
    assert_eq!(second.get(&run("1")).unwrap(), Some(1.0));
    assert!(!second.writer_file().exists());
}

#[test]
fn overwrite_is_honored() {
    let temp_dir = TempDir::new().unwrap();
    let mut first = Store::open(temp_dir.path()).unwrap();
    let mut second = Store::open(temp_dir.path()).unwrap();
    first.add(run("1"), 1.0, false).unwrap();
    backdate(first.writer_file(), 5);

    second.add(run("1"), 2.0, true).unwrap();

    let reader = Store::open(temp_dir.path()).unwrap();
    assert_eq!(reader.get(&run("1")).unwrap(), Some(2.0));
}

#[test]
fn writers_never_clobber_each_other() {
    let temp_dir = TempDir::new().unwrap();
    let mut a = Store::open(temp_dir.path()).unwrap();
    let mut b = Store::open(temp_dir.path()).unwrap();

    for i in 0..10 {
        a.add(run(&format!("a{i}")), i as f64, false).unwrap();
        b.add(run(&format!("b{i}")), -(i as f64), false).unwrap();
    }
    assert_ne!(a.writer_file(), b.writer_file());
    drop(a);
    drop(b);

    let reader = Store::open(temp_dir.path()).unwrap();
    for i in 0..10 {
        assert_eq!(reader.get(&run(&format!("a{i}"))).unwrap(), Some(i as f64));
        assert_eq!(reader.get(&run(&format!("b{i}"))).unwrap(), Some(-(i as f64)));
    }
    assert_eq!(reader.snapshot().unwrap().len(), 20);
}

#[test]
fn later_writer_file_wins() {
    let temp_dir = TempDir::new().unwrap();
    let mut older = Store::open(temp_dir.path()).unwrap();
    let mut newer = Store::open(temp_dir.path()).unwrap();
    newer.add(run("1"), 2.0, false).unwrap();
    older.add(run("1"), 1.0, true).unwrap();
    backdate(older.writer_file(), 10);

    let reader = Store::open(temp_dir.path()).unwrap();

    assert_eq!(reader.get(&run("1")).unwrap(), Some(2.0));
}

#[test]
fn merge_twice_gives_same_content() {
    let temp_dir = TempDir::new().unwrap();
    let mut store = Store::open(temp_dir.path()).unwrap();
    store.add(run("1"), 1.0, false).unwrap();
    store.add(run("2"), 2.0, false).unwrap();

    let first = store.merge(false).unwrap();
    let first_bytes = fs::read(temp_dir.path().join("merged")).unwrap();
    let second = store.merge(false).unwrap();
    let second_bytes = fs::read(temp_dir.path().join("merged")).unwrap();

    assert!(first.succeeded());
    assert!(second.succeeded());
    assert_eq!(first_bytes, second_bytes);

    store.merge(true).unwrap();
    assert_eq!(store.merge(true).unwrap(), MergeOutcome::NothingToMerge);
    assert_eq!(fs::read(temp_dir.path().join("merged")).unwrap(), first_bytes);
}

#[test]
fn merge_with_clear_loses_nothing() {
    let temp_dir = TempDir::new().unwrap();
    for session in 0..4 {
        let mut writer = Store::open(temp_dir.path()).unwrap();
        for i in 0..5 {
            writer
                .add(run(&format!("{session}-{i}")), (session * 10 + i) as f64, false)
                .unwrap();
        }
    }
    assert_eq!(file_names(temp_dir.path()).len(), 4);

    let mut admin = Store::open(temp_dir.path()).unwrap();
    let outcome = admin.merge(true).unwrap();

    assert_eq!(
        outcome,
        MergeOutcome::Merged {
            writer_files: 4,
            keys: 20,
            removed: 4,
            retained: 0,
        }
    );
    assert_eq!(file_names(temp_dir.path()), vec!["merged".to_string()]);
    let reader = Store::open(temp_dir.path()).unwrap();
    for session in 0..4 {
        for i in 0..5 {
            assert_eq!(
                reader.get(&run(&format!("{session}-{i}"))).unwrap(),
                Some((session * 10 + i) as f64)
            );
        }
    }
}

#[test]
fn corrupt_merged_file_blocks_merge() {
    let temp_dir = TempDir::new().unwrap();
    let mut writer = Store::open(temp_dir.path()).unwrap();
    writer.add(run("1"), 1.0, false).unwrap();
    writer.merge(true).unwrap();
    writer.add(run("2"), 2.0, false).unwrap();
    fs::write(temp_dir.path().join("merged"), b"\x01\x02").unwrap();

    let result = writer.merge(true);

    assert!(matches!(result, Err(Error::CorruptMergedFile { .. })));
    assert!(writer.writer_file().exists());
    // The writer file holds everything the session ever added, readers fall
    // back to it.
    let reader = Store::open(temp_dir.path()).unwrap();
    assert_eq!(reader.get(&run("2")).unwrap(), Some(2.0));
    assert_eq!(reader.get(&run("1")).unwrap(), Some(1.0));
}

#[test]
fn run_scenario() {
    let temp_dir = TempDir::new().unwrap();
    let key = run("316899");
    let mut writer_a = Store::open(temp_dir.path()).unwrap();
    let mut writer_b = Store::open(temp_dir.path()).unwrap();

    writer_a.add(key.clone(), 1.23, false).unwrap();
    backdate(writer_a.writer_file(), 1);
    writer_b.add(key.clone(), 1.25, true).unwrap();

    let reader = Store::open(temp_dir.path()).unwrap();
    assert_eq!(reader.get(&key).unwrap(), Some(1.25));

    let mut admin = Store::open(temp_dir.path()).unwrap();
    assert!(admin.merge(true).unwrap().succeeded());

    assert!(!writer_a.writer_file().exists());
    assert!(!writer_b.writer_file().exists());
    assert!(temp_dir.path().join("merged").exists());
    let reader = Store::open(temp_dir.path()).unwrap();
    assert_eq!(reader.get(&key).unwrap(), Some(1.25));
}

#[test]
fn json_store_round_trips_through_merge() {
    let temp_dir = TempDir::new().unwrap();
    let mut store = MergingDirDbJson::<Vec<u32>, String>::open(temp_dir.path()).unwrap();
    store.add(vec![1, 2, 3], "fit".to_string(), false).unwrap();

    store.merge(true).unwrap();

    let reader = MergingDirDbJson::<Vec<u32>, String>::open(temp_dir.path()).unwrap();
    assert_eq!(reader.get(&vec![1, 2, 3]).unwrap(), Some("fit".to_string()));
    assert!(fs::read_to_string(temp_dir.path().join("merged"))
        .unwrap()
        .starts_with('['));
}
