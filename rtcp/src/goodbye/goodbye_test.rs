use bytes::Bytes;
use util::marshal::{Marshal, MarshalSize, Unmarshal};

use super::*;

#[test]
fn test_goodbye_round_trip() {
    let tests: Vec<(&str, Goodbye, Option<Error>)> = vec![
        (
            "empty",
            Goodbye {
                sources: vec![],
                ..Default::default()
            },
            None,
        ),
        (
            "valid",
            Goodbye {
                sources: vec![0x01020304, 0x05060708],
                reason: Bytes::from_static(b"because"),
            },
            None,
        ),
        (
            "empty reason",
            Goodbye {
                sources: vec![0x01020304],
                reason: Bytes::from_static(b""),
            },
            None,
        ),
        (
            "reason no source",
            Goodbye {
                sources: vec![],
                reason: Bytes::from_static(b"foo"),
            },
            None,
        ),
        (
            "short reason",
            Goodbye {
                sources: vec![],
                reason: Bytes::from_static(b"f"),
            },
            None,
        ),
        (
            "long reason",
            Goodbye {
                sources: vec![],
                reason: Bytes::from(vec![b'x'; 1 << 8]),
            },
            Some(Error::ReasonTooLong),
        ),
        (
            "too many sources",
            Goodbye {
                sources: vec![0; 1 << 5],
                ..Default::default()
            },
            Some(Error::TooManySources),
        ),
    ];

    for (name, want, want_error) in tests {
        let got = want.marshal();

        assert_eq!(
            got.is_err(),
            want_error.is_some(),
            "marshal {name}: err = {got:?}, want {want_error:?}"
        );

        if let Some(err) = want_error {
            let got_err = got.err().unwrap();
            assert_eq!(
                got_err,
                err.into(),
                "marshal {name}: err = {got_err:?}, want {err:?}"
            );
        } else {
            let data = got.ok().unwrap();
            assert_eq!(
                data.len() % 4,
                0,
                "marshal {name}: serialized length must be a multiple of 4"
            );

            let actual =
                Goodbye::unmarshal(&mut data.clone()).expect("unmarshal should not error");
            assert_eq!(actual, want, "unmarshal {name}");
        }
    }
}

#[test]
fn test_goodbye_bye_scenario() {
    let bye = Goodbye {
        sources: vec![1000, 2000],
        reason: Bytes::from_static(b"bye"),
    };

    let data = bye.marshal().expect("marshal failed");
    assert_eq!(data.len() % 4, 0);
    assert_eq!(data.len(), bye.marshal_size());

    let parsed = Goodbye::unmarshal(&mut data.clone()).expect("unmarshal failed");
    assert_eq!(parsed, bye);
    assert_eq!(parsed.sources, vec![1000, 2000]);
    assert_eq!(parsed.reason, Bytes::from_static(b"bye"));
}

#[test]
fn test_goodbye_unmarshal_header_mismatch() {
    // BYE announcing two sources but carrying only one.
    let raw = Bytes::from_static(&[
        0x82, 0xcb, 0x00, 0x01, // v=2, count=2, BYE, len=1
        0x90, 0x2f, 0x9e, 0x2e, // ssrc
    ]);

    let result = Goodbye::unmarshal(&mut raw.clone());
    assert_eq!(result, Err(Error::PacketTooShort.into()));
}

#[test]
fn test_goodbye_reason_follows_source_list() {
    // count=1, one SSRC, then reason length 3 + "bye" immediately after the
    // SSRC list per RFC 3550 section 6.6.
    let raw = Bytes::from_static(&[
        0x81, 0xcb, 0x00, 0x02, // v=2, count=1, BYE, len=2
        0x00, 0x00, 0x03, 0xe8, // ssrc 1000
        0x03, b'b', b'y', b'e', // reason
    ]);

    let parsed = Goodbye::unmarshal(&mut raw.clone()).expect("unmarshal failed");
    assert_eq!(parsed.sources, vec![1000]);
    assert_eq!(parsed.reason, Bytes::from_static(b"bye"));
}
