use mhl_core::error::ErrorKind;
use mhl_core::path::{PathComponents, PathStyle, Separator};
use proptest::prelude::*;

fn posix(raw: &str) -> PathComponents {
    PathComponents::parse_with(raw, PathStyle::Posix)
}

fn posix_norm(raw: &str) -> PathComponents {
    let mut p = posix(raw);
    p.normalize().unwrap();
    p
}

fn windows_norm(raw: &str) -> PathComponents {
    let mut p = PathComponents::parse_with(raw, PathStyle::Windows);
    p.normalize().unwrap();
    p
}

#[test]
fn parse_skips_empty_segments_and_detects_root() {
    let p = posix("//media///clips/");
    assert!(p.is_absolute());
    assert_eq!(p.segments(), ["media", "clips"]);

    let r = posix("clips/a.mov");
    assert!(!r.is_absolute());
    assert_eq!(r.segments(), ["clips", "a.mov"]);
}

#[test]
fn normalize_resolves_dots() {
    let p = posix_norm("/media/./day1/../day2/clip.mov");
    assert_eq!(p.render(Separator::Uniform), "/media/day2/clip.mov");
    assert!(p.is_normalized());
}

#[test]
fn normalize_refuses_to_escape_root() {
    let mut abs = posix("/media/../..");
    assert_eq!(abs.normalize().unwrap_err().kind(), ErrorKind::WrongFileLocation);

    let mut rel = posix("a/../../b");
    assert_eq!(rel.normalize().unwrap_err().kind(), ErrorKind::WrongFileLocation);
}

#[test]
fn join_absolute_rules() {
    let base = posix_norm("/media/card");
    let joined = base.join_absolute(&posix("A001/../A002/clip.mov")).unwrap();
    assert_eq!(joined.render(Separator::Uniform), "/media/card/A002/clip.mov");

    let abs = posix("/other/file");
    assert_eq!(base.join_absolute(&abs).unwrap(), abs);

    let err = posix("relative/base").join_absolute(&posix("x")).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InternalError);

    let err = base.join_absolute(&posix("../../../x")).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::WrongFileLocation);
}

#[test]
fn nesting_compares_whole_segments() {
    let base = posix_norm("/media/card");
    assert!(base.is_nested(&posix_norm("/media/card")));
    assert!(base.is_nested(&posix_norm("/media/card/a/b.mov")));
    assert!(!base.is_nested(&posix_norm("/media/cards/b.mov")));
    assert!(!base.is_nested(&posix_norm("/media")));
    // unnormalized input never counts as nested
    assert!(!base.is_nested(&posix("/media/card/x")));
    // case matters on POSIX
    assert!(!base.is_nested(&posix_norm("/Media/card/x")));
}

#[test]
fn extract_relative_tail_or_error() {
    let base = posix_norm("/media/card");
    let rel = base.extract_relative(&posix_norm("/media/card/A001/clip.mov")).unwrap();
    assert!(!rel.is_absolute());
    assert_eq!(rel.render(Separator::Uniform), "A001/clip.mov");

    let err = base.extract_relative(&posix_norm("/elsewhere/clip.mov")).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::WrongFileLocation);
}

#[test]
fn windows_drive_and_case_rules() {
    let p = windows_norm(r"C:\Media\Clip\a.mov");
    assert_eq!(p.root(), Some("C:"));
    assert_eq!(p.render(Separator::Native), r"C:\Media\Clip\a.mov");
    assert_eq!(p.render(Separator::Uniform), "C:/Media/Clip/a.mov");

    let base = windows_norm(r"c:\media");
    assert!(base.is_nested(&p));
    assert_eq!(base.extract_relative(&p).unwrap().render(Separator::Uniform), "Clip/a.mov");
    assert!(!windows_norm(r"D:\Media").is_nested(&p));
    assert_eq!(p.key(), windows_norm("c:/media/clip/A.MOV").key());
}

#[test]
fn windows_unc_and_long_prefix() {
    let unc = windows_norm(r"\\server\share\dir\file.mov");
    assert_eq!(unc.root(), Some(r"\\server\share"));
    assert_eq!(unc.segments(), ["dir", "file.mov"]);
    assert_eq!(unc.render(Separator::Native), r"\\server\share\dir\file.mov");

    let long = windows_norm(r"\\?\D:\very\long");
    assert_eq!(long.root(), Some(r"\\?\D:"));
    assert_eq!(long.segments(), ["very", "long"]);

    let rooted = windows_norm(r"\no\drive");
    assert!(rooted.is_absolute());
    assert_eq!(rooted.root(), None);
}

#[test]
fn parent_and_file_name() {
    let p = posix_norm("/media/card/clip.mov");
    assert_eq!(p.file_name(), Some("clip.mov"));
    assert_eq!(p.parent().unwrap().render(Separator::Uniform), "/media/card");
    assert!(posix_norm("/").parent().is_none());
}

fn segment() -> impl Strategy<Value = String> {
    "[a-zA-Z0-9_]{1,8}"
}

fn noisy_segment() -> impl Strategy<Value = String> {
    prop_oneof![segment(), Just(".".to_string()), Just("..".to_string())]
}

proptest! {
    #[test]
    fn normalize_is_idempotent(depth in prop::collection::vec(segment(), 3..6),
                               tail in prop::collection::vec(noisy_segment(), 0..4)) {
        let raw = format!("/{}/{}", depth.join("/"), tail.join("/"));
        let once = posix_norm(&raw);
        let twice = posix_norm(&once.render(Separator::Uniform));
        prop_assert_eq!(once, twice);
    }

    #[test]
    fn extract_inverts_join(base in prop::collection::vec(segment(), 0..5),
                            rel in prop::collection::vec(segment(), 0..5)) {
        let base = posix_norm(&format!("/{}", base.join("/")));
        let rel = posix(&rel.join("/"));
        let joined = base.join_absolute(&rel).unwrap();
        prop_assert!(base.is_nested(&joined));
        prop_assert_eq!(base.extract_relative(&joined).unwrap(), rel);
    }
}
