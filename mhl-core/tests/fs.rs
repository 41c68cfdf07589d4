use mhl_core::error::ErrorKind;
use mhl_core::fs::{self, EntryKind};
use std::time::{Duration, UNIX_EPOCH};

#[test]
fn stat_reports_size_kind_and_mtime() {
    let td = tempfile::tempdir().unwrap();
    let p = td.path().join("clip.mov");
    std::fs::write(&p, b"abcd").unwrap();
    let f = std::fs::File::options().write(true).open(&p).unwrap();
    f.set_modified(UNIX_EPOCH + Duration::from_secs(1_700_000_000)).unwrap();

    let st = fs::stat(&p).unwrap();
    assert_eq!((st.size, st.kind, st.mtime), (4, EntryKind::File, 1_700_000_000));
    assert_eq!(fs::stat(td.path()).unwrap().kind, EntryKind::Dir);
    assert_eq!(fs::stat(&td.path().join("gone")).unwrap_err().kind(), ErrorKind::NoSuchFile);
}
