use mhl_core::digest::HashType;
use mhl_core::error::{ErrorKind, MhlError};
use mhl_core::manifest::{self, Manifest, ManifestRecord};
use mhl_core::path::{PathComponents, PathStyle, Separator};
use mhl_core::xml::{parse_document, XmlElement};
use std::collections::HashMap;

const MD5_A: &str = "900150983cd24fb0d6963f7d28e17f72";
const SHA1_A: &str = "a9993e364706816aba3e25717850c26c9cd0d89d";
const XX64_A: &str = "99e9d85137db46ef";

fn path(raw: &str) -> PathComponents {
    let mut p = PathComponents::parse_with(raw, PathStyle::Posix);
    p.normalize().unwrap();
    p
}

fn doc(body: &str) -> XmlElement {
    let text = format!("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<hashlist version=\"1.1\">\n{body}\n</hashlist>\n");
    parse_document(text.as_bytes()).unwrap()
}

fn parse(body: &str) -> Result<Manifest, MhlError> {
    Manifest::parse_with(&path("/media/root.mhl"), &doc(body), &mut |p: &PathComponents| -> Result<XmlElement, MhlError> {
        Err(MhlError::new(ErrorKind::MhlNotFound, format!("{p}")))
    })
}

#[test]
fn plain_records_resolve_against_manifest_dir() {
    let m = parse(&format!(
        "<creatorinfo><name>x</name></creatorinfo>
         <hash>
           <file>A001/clip.mov</file>
           <size>3</size>
           <lastmodificationdate>2024-05-01T10:20:30Z</lastmodificationdate>
           <md5> {MD5_A} </md5>
           <hashdate>2024-05-02T00:00:00Z</hashdate>
         </hash>"
    ))
    .unwrap();
    assert_eq!(m.len(), 1);
    let r = m.find(&path("/media/A001/clip.mov")).unwrap();
    assert_eq!(r.declared_relative_path, "A001/clip.mov");
    assert_eq!(r.size, 3);
    assert_eq!(r.hash_type, HashType::Md5);
    assert_eq!(r.hash_hex.as_deref(), Some(MD5_A));
    assert_eq!(r.last_modified, None);
    assert!(!r.is_nested_reference);
    assert_eq!(
        r.dates.last_modification.map(|t| manifest::format_date(&t)).as_deref(),
        Some("2024-05-01T10:20:30Z")
    );
}

#[test]
fn sha1_sticks_once_selected() {
    let m = parse(&format!(
        "<hash><file>a</file><size>1</size><sha1>{SHA1_A}</sha1><md5>{MD5_A}</md5></hash>"
    ))
    .unwrap();
    let r = m.find(&path("/media/a")).unwrap();
    assert_eq!(r.hash_type, HashType::Sha1);
    assert_eq!(r.hash_hex.as_deref(), Some(SHA1_A));
    assert_eq!(r.hash_for(HashType::Md5), Some(MD5_A));
}

#[test]
fn hashes_after_sha1_are_not_validated() {
    let m = parse(&format!(
        "<hash><file>a</file><size>1</size><sha1>{SHA1_A}</sha1><md5>abc</md5><xxhash64></xxhash64></hash>"
    ))
    .unwrap();
    let r = m.find(&path("/media/a")).unwrap();
    assert_eq!(r.hash_type, HashType::Sha1);
    assert_eq!(r.hash_hex.as_deref(), Some(SHA1_A));
    assert_eq!(r.hash_for(HashType::Md5), None);
    assert_eq!(r.hashes.len(), 1);

    // before any sha1 the same value is still a format error
    let err = parse(&format!(
        "<hash><file>a</file><size>1</size><md5>abc</md5><sha1>{SHA1_A}</sha1></hash>"
    ))
    .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::WrongMhlFormat);
}

#[test]
fn last_non_sha1_hash_wins() {
    let m = parse(&format!(
        "<hash><file>a</file><size>1</size><md5>{MD5_A}</md5><xxhash64>{XX64_A}</xxhash64></hash>"
    ))
    .unwrap();
    let r = m.find(&path("/media/a")).unwrap();
    assert_eq!(r.hash_type, HashType::XxHash64);
    assert_eq!(r.hash_hex.as_deref(), Some(XX64_A));
}

#[test]
fn null_record_needs_no_value() {
    let m = parse("<hash><file>n.txt</file><size>0</size><null/></hash>").unwrap();
    let r = m.find(&path("/media/n.txt")).unwrap();
    assert_eq!(r.hash_type, HashType::Null);
    assert!(r.hash_hex.is_none());
}

#[test]
fn incomplete_records_are_format_errors() {
    let cases = [
        format!("<hash><size>1</size><md5>{MD5_A}</md5></hash>"),
        format!("<hash><file>a</file><md5>{MD5_A}</md5></hash>"),
        format!("<hash><file>a</file><size>one</size><md5>{MD5_A}</md5></hash>"),
        "<hash><file>a</file><size>1</size></hash>".to_string(),
        "<hash><file>a</file><size>1</size><crc32>abcd</crc32></hash>".to_string(),
        "<hash><file>a</file><size>1</size><md5>abc</md5></hash>".to_string(),
        "<hash><file>a</file><size>1</size><md5></md5></hash>".to_string(),
        format!("<hash><file>../../escape</file><size>1</size><md5>{MD5_A}</md5></hash>"),
    ];
    for body in &cases {
        let err = parse(body).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::WrongMhlFormat, "{body}");
    }
}

#[test]
fn root_element_and_version_checked() {
    let root = path("/media/root.mhl");
    let mut no_nested = |_: &PathComponents| -> Result<XmlElement, MhlError> { unreachable!() };

    let newer = parse_document(b"<hashlist version=\"1.2\"></hashlist>").unwrap();
    let err = Manifest::parse_with(&root, &newer, &mut no_nested).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::WrongMhlFormat);

    let wrong = parse_document(b"<filelist version=\"1.0\"></filelist>").unwrap();
    let err = Manifest::parse_with(&root, &wrong, &mut no_nested).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::WrongMhlFormat);

    let old = parse_document(b"<hashlist version=\"1.0\"></hashlist>").unwrap();
    assert!(Manifest::parse_with(&root, &old, &mut no_nested).unwrap().is_empty());
}

#[test]
fn duplicate_plain_records_keep_the_first() {
    let m = parse(&format!(
        "<hash><file>a</file><size>1</size><md5>{MD5_A}</md5></hash>
         <hash><file>./a</file><size>2</size><sha1>{SHA1_A}</sha1></hash>"
    ))
    .unwrap();
    assert_eq!(m.len(), 1);
    assert_eq!(m.records()[0].size, 1);
}

#[test]
fn insert_does_not_overwrite() {
    let mut m = Manifest::new();
    let first = ManifestRecord::from_hashes(path("/m/a"), "a".into(), 1, 0, vec![(HashType::Md5, MD5_A.into())]);
    let second = ManifestRecord::from_hashes(path("/m/a"), "a".into(), 9, 0, vec![]);
    assert!(m.insert(first).is_none());
    let existing = m.insert(second).unwrap();
    assert_eq!(existing.size, 1);
    assert_eq!(m.len(), 1);
}

fn nested_loader(
    docs: HashMap<&'static str, XmlElement>,
) -> impl FnMut(&PathComponents) -> Result<XmlElement, MhlError> {
    move |p: &PathComponents| {
        let key = p.render(Separator::Uniform);
        docs.get(key.as_str())
            .cloned()
            .ok_or_else(|| MhlError::new(ErrorKind::MhlNotFound, format!("no such manifest {key}")))
    }
}

#[test]
fn nested_manifest_uses_its_own_directory() {
    let root = doc(&format!(
        "<hash><file>top.mov</file><size>1</size><md5>{MD5_A}</md5></hash>
         <hash referencehashlist=\"yes\"><file>day2/day2.mhl</file><size>10</size><md5>{MD5_A}</md5></hash>"
    ));
    let mut docs = HashMap::new();
    docs.insert(
        "/media/day2/day2.mhl",
        doc(&format!("<hash><file>B001/clip.mov</file><size>5</size><sha1>{SHA1_A}</sha1></hash>")),
    );
    let mut loader = nested_loader(docs);
    let m = Manifest::parse_with(&path("/media/root.mhl"), &root, &mut loader).unwrap();

    assert_eq!(m.len(), 3);
    let reference = m.find(&path("/media/day2/day2.mhl")).unwrap();
    assert!(reference.is_nested_reference);
    let inner = m.find(&path("/media/day2/B001/clip.mov")).unwrap();
    assert_eq!(inner.size, 5);
    assert_eq!(inner.source_manifest.as_ref(), Some(&path("/media/day2/day2.mhl")));
    let order: Vec<String> = m.iter().map(|r| r.absolute_path.render(Separator::Uniform)).collect();
    assert_eq!(order, ["/media/top.mov", "/media/day2/day2.mhl", "/media/day2/B001/clip.mov"]);
}

#[test]
fn nested_reference_cycles_are_rejected() {
    let reference = format!(
        "<hash referencehashlist=\"yes\"><file>sub/sub.mhl</file><size>1</size><md5>{MD5_A}</md5></hash>"
    );
    let root = doc(&reference);
    let mut docs = HashMap::new();
    // sub.mhl points at itself
    docs.insert(
        "/media/sub/sub.mhl",
        doc(&format!(
            "<hash referencehashlist=\"yes\"><file>sub.mhl</file><size>1</size><md5>{MD5_A}</md5></hash>"
        )),
    );
    let mut loader = nested_loader(docs);
    let err = Manifest::parse_with(&path("/media/root.mhl"), &root, &mut loader).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::WrongMhlFormat);

    // sub.mhl points back at the manifest currently being parsed
    let mut docs = HashMap::new();
    docs.insert(
        "/media/sub/sub.mhl",
        doc(&format!(
            "<hash referencehashlist=\"yes\"><file>../root.mhl</file><size>1</size><md5>{MD5_A}</md5></hash>"
        )),
    );
    let mut loader = nested_loader(docs);
    let err = Manifest::parse_with(&path("/media/root.mhl"), &root, &mut loader).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::WrongMhlFormat);
}

#[test]
fn malformed_nested_manifest_aborts_everything() {
    let root = doc(&format!(
        "<hash referencehashlist=\"yes\"><file>n.mhl</file><size>1</size><md5>{MD5_A}</md5></hash>"
    ));
    let mut docs = HashMap::new();
    docs.insert("/media/n.mhl", doc("<hash><file>x</file></hash>"));
    let mut loader = nested_loader(docs);
    let err = Manifest::parse_with(&path("/media/root.mhl"), &root, &mut loader).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::WrongMhlFormat);
}

#[test]
fn load_and_discover_from_disk() {
    let td = tempfile::tempdir().unwrap();
    let deep = td.path().join("card/A001");
    std::fs::create_dir_all(&deep).unwrap();
    std::fs::write(deep.join("clip.mov"), b"abc").unwrap();
    let body = format!(
        "<?xml version=\"1.0\"?><hashlist version=\"1.1\"><hash><file>card/A001/clip.mov</file><size>3</size><md5>{MD5_A}</md5></hash></hashlist>"
    );
    std::fs::write(td.path().join("b_second.mhl"), &body).unwrap();
    std::fs::write(td.path().join("a_first.mhl"), &body).unwrap();

    let found = manifest::find_manifest_for(&deep.join("clip.mov")).unwrap();
    assert_eq!(found.file_name().unwrap(), "a_first.mhl");

    let m = Manifest::load(&found).unwrap();
    let mut key = PathComponents::from_path(&deep.join("clip.mov")).unwrap();
    key.normalize().unwrap();
    assert_eq!(m.find(&key).unwrap().size, 3);

    let missing = Manifest::load(&td.path().join("none.mhl")).unwrap_err();
    assert_eq!(missing.kind(), ErrorKind::MhlNotFound);

    std::fs::write(td.path().join("broken.mhl"), b"<hashlist><hash>").unwrap();
    let broken = Manifest::load(&td.path().join("broken.mhl")).unwrap_err();
    assert_eq!(broken.kind(), ErrorKind::WrongMhlFormat);
}
