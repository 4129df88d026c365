use bmffdump::boxes::{BoxHeader, FourCC};
use bmffdump::cursor::PayloadCursor;
use bmffdump::error::{FieldWarning, ParseError, Result};
use bmffdump::parser::{DumpOptions, DumpReport, dump};
use bmffdump::printer::BoxVisitor;
use bmffdump::registry::{BoxDecoder, Registry, StructuredData, default_registry};
use std::io::{self, Cursor};

fn boxed(typ: &[u8; 4], payload: &[u8]) -> Vec<u8> {
    let mut v = Vec::new();
    v.extend_from_slice(&((payload.len() + 8) as u32).to_be_bytes());
    v.extend_from_slice(typ);
    v.extend_from_slice(payload);
    v
}

fn full(version: u8, flags: u32, body: &[u8]) -> Vec<u8> {
    let mut v = ((u32::from(version) << 24) | flags).to_be_bytes().to_vec();
    v.extend_from_slice(body);
    v
}

/// Fields after the four timing fields: rate 1.0, volume 1.0, identity matrix,
/// next_track_id 2. `reserved` fills the 32-bit reserved words.
fn mvhd_tail(reserved: u32) -> Vec<u8> {
    let mut v = Vec::new();
    v.extend_from_slice(&0x0001_0000u32.to_be_bytes()); // rate
    v.extend_from_slice(&0x0100u16.to_be_bytes()); // volume
    v.extend_from_slice(&0u16.to_be_bytes());
    v.extend_from_slice(&reserved.to_be_bytes());
    v.extend_from_slice(&reserved.to_be_bytes());
    for m in [0x0001_0000u32, 0, 0, 0, 0x0001_0000, 0, 0, 0, 0x4000_0000] {
        v.extend_from_slice(&m.to_be_bytes());
    }
    v.extend_from_slice(&[0u8; 24]); // pre_defined
    v.extend_from_slice(&2u32.to_be_bytes());
    v
}

fn mvhd_v0(timescale: u32, duration: u32) -> Vec<u8> {
    let mut body = Vec::new();
    for f in [1u32, 2, timescale, duration] {
        body.extend_from_slice(&f.to_be_bytes());
    }
    body.extend(mvhd_tail(0));
    boxed(b"mvhd", &full(0, 0, &body))
}

fn mvhd_v1(timescale: u32, duration: u64) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(&1u64.to_be_bytes());
    body.extend_from_slice(&2u64.to_be_bytes());
    body.extend_from_slice(&timescale.to_be_bytes());
    body.extend_from_slice(&duration.to_be_bytes());
    body.extend(mvhd_tail(0));
    boxed(b"mvhd", &full(1, 0, &body))
}

#[derive(Default)]
struct Collect {
    decoded: Vec<StructuredData>,
    failed: Vec<String>,
    entered: Vec<String>,
}

impl BoxVisitor for Collect {
    fn enter(&mut self, hdr: &BoxHeader) -> io::Result<()> {
        self.entered.push(hdr.typ.to_string());
        Ok(())
    }

    fn decoded(&mut self, _hdr: &BoxHeader, data: &StructuredData) -> io::Result<()> {
        self.decoded.push(data.clone());
        Ok(())
    }

    fn failed(&mut self, hdr: &BoxHeader, _err: &ParseError) -> io::Result<()> {
        self.failed.push(hdr.typ.to_string());
        Ok(())
    }

    fn leave(&mut self, _hdr: &BoxHeader) -> io::Result<()> {
        Ok(())
    }
}

fn run(data: Vec<u8>) -> (Result<DumpReport>, Collect) {
    let mut c = Collect::default();
    let res = dump(
        Cursor::new(data),
        &default_registry(),
        &DumpOptions::default(),
        &mut c,
    );
    (res, c)
}

#[test]
fn ftyp_with_one_compatible_brand() {
    let mut p = Vec::new();
    p.extend_from_slice(b"mp42");
    p.extend_from_slice(&1u32.to_be_bytes());
    p.extend_from_slice(b"dash");
    let data = boxed(b"ftyp", &p);
    assert_eq!(data.len(), 20);

    let (res, c) = run(data);
    res.unwrap();
    match &c.decoded[..] {
        [StructuredData::FileType(f)] => {
            assert_eq!(f.major_brand, FourCC(*b"mp42"));
            assert_eq!(f.minor_version, 1);
            assert_eq!(f.compatible_brands, vec![FourCC(*b"dash")]);
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn ftyp_brands_keep_stream_order() {
    let mut p = b"isom".to_vec();
    p.extend_from_slice(&0u32.to_be_bytes());
    p.extend_from_slice(b"iso6cmfcmp41");
    let (res, c) = run(boxed(b"ftyp", &p));
    res.unwrap();
    let StructuredData::FileType(f) = &c.decoded[0] else {
        panic!("expected ftyp");
    };
    let brands: Vec<String> = f.compatible_brands.iter().map(|b| b.to_string()).collect();
    assert_eq!(brands, ["iso6", "cmfc", "mp41"]);
}

#[test]
fn ftyp_with_ragged_brand_list_is_malformed() {
    let mut p = b"isom".to_vec();
    p.extend_from_slice(&0u32.to_be_bytes());
    p.extend_from_slice(b"ab");
    let (res, _) = run(boxed(b"ftyp", &p));
    assert!(matches!(res.unwrap_err(), ParseError::MalformedSize { size: 18, .. }));
}

#[test]
fn ftyp_shorter_than_fixed_fields_is_too_short() {
    let (res, _) = run(boxed(b"ftyp", b"isom"));
    assert!(matches!(res.unwrap_err(), ParseError::TooShort { size: 12, required: 16, .. }));
}

#[test]
fn mvhd_versions_share_semantics() {
    let mut data = mvhd_v0(1000, 5000);
    data.extend(mvhd_v1(1000, 5000));
    assert_eq!(data.len(), 108 + 120);

    let (res, c) = run(data);
    assert!(res.unwrap().warnings.is_empty());
    let [StructuredData::MovieHeader(v0), StructuredData::MovieHeader(v1)] = &c.decoded[..] else {
        panic!("expected two mvhd");
    };
    assert_eq!(v0.version, 0);
    assert_eq!(v1.version, 1);
    for m in [v0, v1] {
        assert_eq!(m.creation_time, 1);
        assert_eq!(m.modification_time, 2);
        assert_eq!(m.timescale, 1000);
        assert_eq!(m.duration, 5000);
        assert_eq!(m.duration_seconds().unwrap(), 5.0);
        assert_eq!(f64::from(m.rate), 1.0);
        assert_eq!(f64::from(m.volume), 1.0);
        assert!(m.matrix.is_identity());
        assert_eq!(m.next_track_id, 2);
    }
}

#[test]
fn mvhd_64bit_duration_is_not_truncated() {
    let (res, c) = run(mvhd_v1(90_000, 1u64 << 40));
    res.unwrap();
    let StructuredData::MovieHeader(m) = &c.decoded[0] else {
        panic!("expected mvhd");
    };
    assert_eq!(m.duration, 1u64 << 40);
}

#[test]
fn mvhd_zero_timescale_is_a_hazard() {
    let (res, c) = run(mvhd_v0(0, 5000));
    let report = res.unwrap();
    assert_eq!(report.warnings.len(), 1);
    assert_eq!(report.warnings[0].warning, FieldWarning::ZeroTimescale);

    let StructuredData::MovieHeader(m) = &c.decoded[0] else {
        panic!("expected mvhd");
    };
    assert!(matches!(m.duration_seconds(), Err(ParseError::DivisionHazard { .. })));
}

#[test]
fn mvhd_nonzero_reserved_warns_but_decodes() {
    let mut body = Vec::new();
    for f in [0u32, 0, 600, 1200] {
        body.extend_from_slice(&f.to_be_bytes());
    }
    body.extend(mvhd_tail(7));
    let (res, c) = run(boxed(b"mvhd", &full(0, 0, &body)));
    let report = res.unwrap();
    assert_eq!(report.warnings.len(), 2);
    assert!(matches!(
        report.warnings[0].warning,
        FieldWarning::ReservedNonZero { value: 7, .. }
    ));
    assert_eq!(c.decoded.len(), 1);
}

#[test]
fn mvhd_short_for_its_version_is_too_short() {
    let mut data = mvhd_v0(1000, 1);
    data.truncate(100);
    data[..4].copy_from_slice(&100u32.to_be_bytes());
    let (res, _) = run(data);
    assert!(matches!(res.unwrap_err(), ParseError::TooShort { required: 108, .. }));
}

#[test]
fn mvhd_unknown_version_fails_only_that_box() {
    let mut data = mvhd_v0(1000, 1);
    data[8] = 2; // version byte
    data.extend(boxed(b"free", &[]));

    let (res, c) = run(data);
    let report = res.unwrap();
    assert_eq!(report.undecoded, 1);
    assert_eq!(c.failed, ["mvhd"]);
    assert_eq!(c.entered, ["mvhd", "free"]);
}

#[test]
fn mehd_width_follows_version() {
    let mut data = boxed(b"mehd", &full(0, 0, &77u32.to_be_bytes()));
    data.extend(boxed(b"mehd", &full(1, 0, &(u64::from(u32::MAX) + 1).to_be_bytes())));
    assert_eq!(data.len(), 16 + 20);

    let (res, c) = run(data);
    res.unwrap();
    let durations: Vec<u64> = c
        .decoded
        .iter()
        .map(|d| match d {
            StructuredData::MovieExtendsHeader(m) => m.fragment_duration,
            other => panic!("unexpected {other:?}"),
        })
        .collect();
    assert_eq!(durations, [77, 1u64 << 32]);
}

#[test]
fn mehd_padding_past_its_version_warns() {
    // Version 0 payload padded to version 1 length.
    let mut data = boxed(b"mehd", &full(0, 0, &[0, 0, 0, 9, 0, 0, 0, 0]));
    data.extend(boxed(b"free", &[]));
    let (res, c) = run(data);
    let report = res.unwrap();
    assert_eq!(report.warnings.len(), 1);
    assert_eq!(report.warnings[0].warning, FieldWarning::TrailingBytes { count: 4 });
    match &c.decoded[..] {
        [StructuredData::MovieExtendsHeader(m)] => assert_eq!(m.fragment_duration, 9),
        other => panic!("unexpected {other:?}"),
    }
    assert_eq!(c.entered, ["mehd", "free"]);
}

#[test]
fn mvhd_with_trailing_bytes_decodes_and_walk_continues() {
    let mut mvhd = mvhd_v0(600, 1200);
    mvhd.extend_from_slice(&[0xaa; 4]);
    mvhd[..4].copy_from_slice(&112u32.to_be_bytes());
    let mut data = boxed(b"moov", &mvhd);
    data.extend(boxed(b"free", &[]));

    let (res, c) = run(data);
    let report = res.unwrap();
    assert_eq!(report.boxes, 3);
    assert_eq!(report.warnings.len(), 1);
    assert_eq!(report.warnings[0].offset, 8);
    assert_eq!(report.warnings[0].warning, FieldWarning::TrailingBytes { count: 4 });
    let [StructuredData::MovieHeader(m)] = &c.decoded[..] else {
        panic!("expected one mvhd");
    };
    assert_eq!(m.timescale, 600);
    assert_eq!(m.next_track_id, 2);
    assert_eq!(c.entered, ["moov", "mvhd", "free"]);
}

#[test]
fn nested_too_short_reports_depth() {
    // mfhd inside moov, declared 10 bytes: room for a header, not the version word.
    let mut mfhd = 10u32.to_be_bytes().to_vec();
    mfhd.extend_from_slice(b"mfhd");
    mfhd.extend_from_slice(&[0, 0]);
    let (res, _) = run(boxed(b"moov", &mfhd));
    assert!(matches!(
        res.unwrap_err(),
        ParseError::TooShort { offset: 8, depth: 1, size: 10, required: 12, .. }
    ));
}

#[test]
fn mfhd_sequence_number_with_flag_warning() {
    let data = boxed(b"moof", &boxed(b"mfhd", &full(0, 1, &42u32.to_be_bytes())));
    let (res, c) = run(data);
    let report = res.unwrap();
    assert_eq!(report.warnings[0].warning, FieldWarning::UnexpectedFlags { flags: 1 });
    assert_eq!(report.warnings[0].offset, 8);
    match &c.decoded[..] {
        [StructuredData::MovieFragmentHeader(m)] => assert_eq!(m.sequence_number, 42),
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn mfhd_nonzero_version_fails_only_that_box() {
    let mut kids = boxed(b"mfhd", &full(1, 0, &1u32.to_be_bytes()));
    kids.extend(boxed(b"traf", &[]));
    let (res, c) = run(boxed(b"moof", &kids));
    assert_eq!(res.unwrap().undecoded, 1);
    assert_eq!(c.entered, ["moof", "mfhd", "traf"]);
    assert!(c.decoded.is_empty());
}

struct Fixed;

impl BoxDecoder for Fixed {
    fn decode(
        &self,
        r: &mut PayloadCursor<'_>,
        _hdr: &BoxHeader,
        _warnings: &mut Vec<FieldWarning>,
    ) -> Result<StructuredData> {
        let sequence_number = r.read_u32()?;
        Ok(StructuredData::MovieFragmentHeader(bmffdump::registry::MfhdData {
            flags: 0,
            sequence_number,
        }))
    }
}

#[test]
fn registry_invokes_decoder() {
    let reg = Registry::new().with_decoder(FourCC(*b"mfhd"), "fixed", Box::new(Fixed));
    assert_eq!(reg.name(&FourCC(*b"mfhd")), Some("fixed"));

    let hdr = BoxHeader {
        size: 12,
        typ: FourCC(*b"mfhd"),
        start: 0,
        depth: 0,
    };
    let payload = 9u32.to_be_bytes();
    let mut r = PayloadCursor::from_slice(&payload);
    let mut warnings = Vec::new();

    let res = reg.decode(&FourCC(*b"mfhd"), &mut r, &hdr, &mut warnings);
    match res.unwrap().unwrap() {
        StructuredData::MovieFragmentHeader(m) => assert_eq!(m.sequence_number, 9),
        other => panic!("unexpected {other:?}"),
    }
    assert!(reg.decode(&FourCC(*b"mvhd"), &mut r, &hdr, &mut warnings).is_none());
}
