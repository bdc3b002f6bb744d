//! Damaged, foreign and hand-crafted archives must fail with the right error
//! kind and never panic.

mod common;

use common::{build, outer_len, rewrite_outer, seal_inner_raw, seal_uncompressed};
use qcx::format::write_framed;
use qcx::{inspect_archive, open_archive, OpenOptions, QcxError};
use serde_json::json;

const PW: &str = "pw1234";

fn open(bytes: &[u8], password: &str) -> QcxError {
    open_archive(bytes, password, &OpenOptions::default(), None).unwrap_err()
}

fn inner_raw(header: serde_json::Value, blob: &[u8]) -> Vec<u8> {
    let mut raw = Vec::new();
    write_framed(&mut raw, &serde_json::to_vec(&header).unwrap()).unwrap();
    raw.extend_from_slice(blob);
    raw
}

#[test]
fn every_truncation_inside_outer_header_is_malformed() {
    let bytes = build(&[("a.txt", b"hello")], PW);
    let header_end = 4 + outer_len(&bytes);
    for len in 0..header_end {
        match open(&bytes[..len], PW) {
            QcxError::MalformedArchive(_) => {}
            other => panic!("truncated to {} bytes: unexpected {:?}", len, other),
        }
    }
}

#[test]
fn truncated_ciphertext_fails_authentication() {
    let bytes = build(&[("a.txt", b"hello")], PW);
    let header_end = 4 + outer_len(&bytes);
    for cut in [header_end, header_end + 1, bytes.len() - 1] {
        assert!(matches!(open(&bytes[..cut], PW), QcxError::AuthenticationFailure));
    }
}

#[test]
fn empty_and_garbage_input() {
    assert!(matches!(open(&[], PW), QcxError::MalformedArchive(_)));
    assert!(matches!(open(b"PK\x03\x04 not a qcx file", PW), QcxError::MalformedArchive(_)));
    assert!(matches!(inspect_archive(&[0xff; 64]), Err(QcxError::MalformedArchive(_))));

    let mut not_json = Vec::new();
    write_framed(&mut not_json, b"this is not json").unwrap();
    not_json.extend_from_slice(&[0u8; 32]);
    assert!(matches!(open(&not_json, PW), QcxError::MalformedArchive(_)));
}

#[test]
fn zero_outer_length_is_malformed() {
    let mut bytes = vec![0u8, 0, 0, 0];
    bytes.extend_from_slice(&[0u8; 40]);
    assert!(matches!(open(&bytes, PW), QcxError::MalformedArchive(_)));
}

#[test]
fn future_version_is_unsupported_even_with_wrong_password() {
    let bytes = build(&[("a.txt", b"hello")], PW);
    let patched = rewrite_outer(&bytes, |v| v["version"] = json!(99));
    assert!(matches!(open(&patched, PW), QcxError::UnsupportedFormat(_)));
    assert!(matches!(open(&patched, "not-the-password"), QcxError::UnsupportedFormat(_)));
    assert!(matches!(inspect_archive(&patched), Err(QcxError::UnsupportedFormat(_))));
}

/// Replaces the outer header with arbitrary JSON, keeping the ciphertext.
fn with_outer_text(archive: &[u8], text: &str) -> Vec<u8> {
    let mut out = Vec::new();
    write_framed(&mut out, text.as_bytes()).unwrap();
    out.extend_from_slice(&archive[4 + outer_len(archive)..]);
    out
}

#[test]
fn other_version_layout_is_unsupported_not_malformed() {
    let bytes = build(&[("a.txt", b"hello")], PW);
    let v99 = with_outer_text(&bytes, r#"{"magic":"QCX3","version":99,"crypto":{"suite":"xchacha"}}"#);
    assert!(matches!(open(&v99, PW), QcxError::UnsupportedFormat(_)));
    assert!(matches!(open(&v99, "wrong-password"), QcxError::UnsupportedFormat(_)));
    assert!(matches!(inspect_archive(&v99), Err(QcxError::UnsupportedFormat(_))));
}

#[test]
fn foreign_header_shape_is_unsupported() {
    let bytes = build(&[("a.txt", b"hello")], PW);
    let foreign = with_outer_text(&bytes, r#"{"magic":"ZIP!","version":"2.0"}"#);
    assert!(matches!(open(&foreign, PW), QcxError::UnsupportedFormat(_)));
    assert!(matches!(inspect_archive(&foreign), Err(QcxError::UnsupportedFormat(_))));
}

#[test]
fn v3_header_missing_fields_is_malformed() {
    let bytes = build(&[("a.txt", b"hello")], PW);
    let patched = rewrite_outer(&bytes, |v| {
        v.as_object_mut().unwrap().remove("kdf");
    });
    assert!(matches!(open(&patched, PW), QcxError::MalformedArchive(_)));
}

#[test]
fn foreign_magic_is_unsupported() {
    let bytes = build(&[("a.txt", b"hello")], PW);
    let patched = rewrite_outer(&bytes, |v| v["magic"] = json!("QCX2"));
    assert!(matches!(open(&patched, PW), QcxError::UnsupportedFormat(_)));
}

#[test]
fn unknown_algorithms_are_unsupported() {
    let bytes = build(&[("a.txt", b"hello")], PW);
    let kdf = rewrite_outer(&bytes, |v| v["kdf"]["algo"] = json!("scrypt"));
    let hash = rewrite_outer(&bytes, |v| v["kdf"]["hash"] = json!("SHA-1"));
    let cipher = rewrite_outer(&bytes, |v| v["cipher"]["algo"] = json!("ChaCha20"));
    for patched in [kdf, hash, cipher] {
        assert!(matches!(open(&patched, PW), QcxError::UnsupportedFormat(_)));
    }
}

#[test]
fn iteration_count_outside_window_is_refused() {
    let bytes = build(&[("a.txt", b"hello")], PW);
    let huge = rewrite_outer(&bytes, |v| v["kdf"]["iterations"] = json!(u32::MAX));
    assert!(matches!(open(&huge, PW), QcxError::UnsupportedFormat(_)));

    let zero = rewrite_outer(&bytes, |v| v["kdf"]["iterations"] = json!(0));
    assert!(matches!(open(&zero, PW), QcxError::UnsupportedFormat(_)));
}

#[test]
fn bad_salt_or_iv_is_malformed() {
    let bytes = build(&[("a.txt", b"hello")], PW);
    let empty_salt = rewrite_outer(&bytes, |v| v["kdf"]["saltHex"] = json!(""));
    let bad_hex = rewrite_outer(&bytes, |v| v["kdf"]["saltHex"] = json!("zz"));
    let short_iv = rewrite_outer(&bytes, |v| v["cipher"]["ivHex"] = json!("00112233"));
    let padded_salt = rewrite_outer(&bytes, |v| {
        let salt = v["kdf"]["saltHex"].as_str().unwrap().to_string();
        v["kdf"]["saltHex"] = json!(format!(" {} ", salt));
    });
    for patched in [empty_salt, bad_hex, short_iv, padded_salt] {
        assert!(matches!(open(&patched, PW), QcxError::MalformedArchive(_)));
    }
}

#[test]
fn changed_salt_fails_authentication() {
    let bytes = build(&[("a.txt", b"hello")], PW);
    let patched = rewrite_outer(&bytes, |v| v["kdf"]["saltHex"] = json!("00".repeat(16)));
    assert!(matches!(open(&patched, PW), QcxError::AuthenticationFailure));
}

#[test]
fn payload_that_is_not_zlib_is_malformed() {
    let sealed = seal_uncompressed(b"definitely not a zlib stream", PW);
    assert!(matches!(open(&sealed, PW), QcxError::MalformedArchive(_)));
}

#[test]
fn inner_length_out_of_bounds_is_malformed() {
    let mut zero = vec![0u8, 0, 0, 0];
    zero.extend_from_slice(b"{}");
    let mut too_long = 1_000u32.to_le_bytes().to_vec();
    too_long.extend_from_slice(b"{}");
    let short = vec![2u8, 0];

    for raw in [zero, too_long, short] {
        let sealed = seal_inner_raw(&raw, PW);
        assert!(matches!(open(&sealed, PW), QcxError::MalformedArchive(_)));
    }
}

#[test]
fn inner_header_that_is_not_json_is_malformed() {
    let mut raw = Vec::new();
    write_framed(&mut raw, b"[not, an, inner header").unwrap();
    let sealed = seal_inner_raw(&raw, PW);
    assert!(matches!(open(&sealed, PW), QcxError::MalformedArchive(_)));
}

#[test]
fn consistent_hand_made_inner_payload_opens() {
    let header = json!({
        "fileCount": 2,
        "totalSize": 10,
        "uniqueSize": 5,
        "files": [
            {"path": "a.txt", "mime": "text/plain", "offset": 0, "length": 5, "size": 5, "crc32Hex": "3610a686"},
            {"path": "b.txt", "mime": "text/plain", "offset": 0, "length": 5, "size": 5, "crc32": "3610a686"}
        ],
        "createdAt": 0
    });
    let sealed = seal_inner_raw(&inner_raw(header, b"hello"), PW);
    let opened = open_archive(&sealed, PW, &OpenOptions::default(), None).unwrap();
    assert_eq!(opened.file_data(1).unwrap(), b"hello");
    opened.verify().unwrap();
}

#[test]
fn inconsistent_inner_headers_are_malformed() {
    let file = |offset: u64, length: u64, size: u64| {
        json!({"path": "a.txt", "mime": "text/plain", "offset": offset,
               "length": length, "size": size, "crc32Hex": "3610a686"})
    };
    let header = |count: u64, total: u64, unique: u64, files: Vec<serde_json::Value>| {
        json!({"fileCount": count, "totalSize": total, "uniqueSize": unique,
               "files": files, "createdAt": 0})
    };

    let cases = [
        // window past the end of the blob
        header(1, 5, 5, vec![file(3, 5, 5)]),
        // fileCount disagrees with the entry list
        header(2, 5, 5, vec![file(0, 5, 5)]),
        // uniqueSize disagrees with the blob
        header(1, 5, 6, vec![file(0, 5, 5)]),
        // totalSize disagrees with the sizes
        header(1, 7, 5, vec![file(0, 5, 5)]),
        // stored length differs from original size
        header(1, 4, 5, vec![file(0, 5, 4)]),
        // offset + length overflows
        header(1, 5, 5, vec![file(u64::MAX, 5, 5)]),
    ];
    for (idx, case) in cases.into_iter().enumerate() {
        let sealed = seal_inner_raw(&inner_raw(case, b"hello"), PW);
        match open(&sealed, PW) {
            QcxError::MalformedArchive(_) => {}
            other => panic!("case {}: unexpected {:?}", idx, other),
        }
    }
}

#[test]
fn corrupted_crc_is_caught_by_verify() {
    let header = json!({
        "fileCount": 1, "totalSize": 5, "uniqueSize": 5,
        "files": [{"path": "a.txt", "mime": "text/plain", "offset": 0,
                   "length": 5, "size": 5, "crc32Hex": "deadbeef"}],
        "createdAt": 0
    });
    let sealed = seal_inner_raw(&inner_raw(header, b"hello"), PW);
    let opened = open_archive(&sealed, PW, &OpenOptions::default(), None).unwrap();
    assert_eq!(opened.file_data(0).unwrap(), b"hello");
    assert!(matches!(opened.verify(), Err(QcxError::MalformedArchive(_))));
}

#[test]
fn signed_crc_hex_is_rejected_by_verify() {
    let header = json!({
        "fileCount": 1, "totalSize": 5, "uniqueSize": 5,
        "files": [{"path": "a.txt", "mime": "text/plain", "offset": 0,
                   "length": 5, "size": 5, "crc32Hex": "+3610a686"}],
        "createdAt": 0
    });
    let sealed = seal_inner_raw(&inner_raw(header, b"hello"), PW);
    let opened = open_archive(&sealed, PW, &OpenOptions::default(), None).unwrap();
    assert!(matches!(opened.entries()[0].crc32(), Err(QcxError::MalformedArchive(_))));
    assert!(matches!(opened.verify(), Err(QcxError::MalformedArchive(_))));
}
