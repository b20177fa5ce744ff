use std::collections::HashSet;
use std::sync::Mutex;

use base64::{Engine, engine::general_purpose::STANDARD};
use msgseal::crypto::{KEY_LEN, SALT_LEN};
use msgseal::{CipherAlgorithm, ErrorKind, Hooks, KdfParams, Pipeline, Progress, Stage, format};
use proptest::prelude::*;
use serde_json::Value;

fn cheap() -> Option<KdfParams> {
    Some(KdfParams::pbkdf2(1_000).unwrap())
}

fn seal(message: &str, password: &str, algorithm: CipherAlgorithm) -> String {
    Pipeline::new()
        .encrypt(message, password, algorithm, cheap())
        .unwrap()
        .into_record()
}

fn decrypt_kind(record: &str, password: &str) -> ErrorKind {
    Pipeline::new().decrypt(record, password).unwrap_err().kind()
}

/// Applies `edit` to the record's JSON and serializes it back.
fn edit_record(record: &str, edit: impl FnOnce(&mut Value)) -> String {
    let mut value: Value = serde_json::from_str(record).unwrap();
    edit(&mut value);
    value.to_string()
}

#[test]
fn hello_world_scenario() {
    let pipeline = Pipeline::new();
    let sealed = pipeline
        .encrypt("hello world", "Tr0ub4dor&3", CipherAlgorithm::Aes256Gcm, None)
        .unwrap();

    let bundle = sealed.bundle();
    assert_eq!(bundle.nonce().len(), 12);
    assert_eq!(bundle.salt().len(), SALT_LEN);
    assert_eq!(bundle.derivation().key_len(), KEY_LEN);
    assert_eq!(
        *bundle.derivation().params(),
        KdfParams::Pbkdf2 { iterations: 100_000 }
    );
    assert_eq!(bundle.plaintext_len(), "hello world".len());

    let opened = pipeline.decrypt(sealed.record(), "Tr0ub4dor&3").unwrap();
    assert_eq!(opened.plaintext(), "hello world");

    let err = pipeline.decrypt(sealed.record(), "wrong").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::AuthenticationFailed);
}

#[test]
fn same_inputs_give_different_records() {
    let a = seal("same", "pw", CipherAlgorithm::Aes256Gcm);
    let b = seal("same", "pw", CipherAlgorithm::Aes256Gcm);
    assert_ne!(a, b);

    let a = format::decode(&a).unwrap();
    let b = format::decode(&b).unwrap();
    assert_ne!(a.salt(), b.salt());
    assert_ne!(a.nonce(), b.nonce());
}

#[test]
fn nonces_do_not_repeat() {
    let pipeline = Pipeline::new();
    let kdf = Some(KdfParams::pbkdf2(1).unwrap());
    let mut seen = HashSet::new();

    for _ in 0..10_000 {
        let sealed = pipeline
            .encrypt("x", "pw", CipherAlgorithm::ChaCha20Poly1305, kdf)
            .unwrap();
        assert!(seen.insert(sealed.bundle().nonce().to_vec()));
    }
}

#[test]
fn every_tampered_ciphertext_byte_is_detected() {
    for algorithm in [CipherAlgorithm::Aes256Gcm, CipherAlgorithm::ChaCha20Poly1305] {
        let record = seal("integrity matters", "pw", algorithm);
        let bundle = format::decode(&record).unwrap();

        for i in 0..bundle.ciphertext().len() {
            let mut ciphertext = bundle.ciphertext().to_vec();
            ciphertext[i] ^= 0x01;
            let tampered = edit_record(&record, |v| {
                v["ciphertext"] = Value::String(STANDARD.encode(&ciphertext));
            });
            assert_eq!(
                decrypt_kind(&tampered, "pw"),
                ErrorKind::AuthenticationFailed,
                "{algorithm}: byte {i}"
            );
        }
    }
}

#[test]
fn every_tampered_nonce_byte_is_detected() {
    let record = seal("integrity matters", "pw", CipherAlgorithm::Aes256Gcm);
    let bundle = format::decode(&record).unwrap();

    for i in 0..bundle.nonce().len() {
        let mut nonce = bundle.nonce().to_vec();
        nonce[i] ^= 0x80;
        let tampered = edit_record(&record, |v| {
            v["nonce"] = Value::String(hex::encode(&nonce));
        });
        assert_eq!(decrypt_kind(&tampered, "pw"), ErrorKind::AuthenticationFailed);
    }
}

#[test]
fn tampered_header_fields_are_detected() {
    let record = seal("bound header", "pw", CipherAlgorithm::Aes256Gcm);
    let bundle = format::decode(&record).unwrap();

    let mut salt = bundle.salt().to_vec();
    salt[0] ^= 0x01;
    let edits: Vec<Box<dyn Fn(&mut Value)>> = vec![
        Box::new(move |v| v["kdf"]["salt"] = Value::String(hex::encode(&salt))),
        Box::new(|v| v["kdf"]["iterations"] = Value::from(1_001)),
        Box::new(|v| v["createdAt"] = Value::String("2000-01-01T00:00:00.000Z".into())),
        Box::new(|v| v["algorithm"] = Value::String("ChaCha20-Poly1305".into())),
    ];

    for edit in edits {
        let tampered = edit_record(&record, |v| edit(v));
        assert_eq!(decrypt_kind(&tampered, "pw"), ErrorKind::AuthenticationFailed);
    }
}

#[test]
fn malformed_records_are_rejected() {
    let record = seal("shape", "pw", CipherAlgorithm::Aes256Gcm);

    let missing_algorithm = edit_record(&record, |v| {
        v.as_object_mut().unwrap().remove("algorithm");
    });
    let short_salt = edit_record(&record, |v| {
        v["kdf"]["salt"] = Value::String("00112233".into());
    });
    let short_nonce = edit_record(&record, |v| {
        v["nonce"] = Value::String("0011".into());
    });
    let truncated = edit_record(&record, |v| {
        v["ciphertext"] = Value::String(STANDARD.encode([0u8; 8]));
    });

    for bad in [
        missing_algorithm,
        short_salt,
        short_nonce,
        truncated,
        String::new(),
        "{}".into(),
        "not json".into(),
    ] {
        assert_eq!(decrypt_kind(&bad, "pw"), ErrorKind::MalformedBundle, "{bad}");
    }
}

#[test]
fn unknown_kdf_in_record_fails_derivation() {
    let record = seal("kdf", "pw", CipherAlgorithm::Aes256Gcm);
    let tampered = edit_record(&record, |v| {
        v["kdf"]["algorithm"] = Value::String("bcrypt".into());
    });
    assert_eq!(decrypt_kind(&tampered, "pw"), ErrorKind::KeyDerivationFailed);
}

#[test]
fn every_kdf_roundtrips() {
    let pipeline = Pipeline::new();
    for params in [
        KdfParams::pbkdf2(1_000).unwrap(),
        KdfParams::scrypt(1024, 8, 1).unwrap(),
        KdfParams::argon2id(64, 1, 1).unwrap(),
    ] {
        let sealed = pipeline
            .encrypt("kdf roundtrip", "pw", CipherAlgorithm::Aes256Gcm, Some(params))
            .unwrap();
        assert_eq!(*sealed.bundle().derivation().params(), params);

        let opened = pipeline.decrypt(sealed.record(), "pw").unwrap();
        assert_eq!(opened.plaintext(), "kdf roundtrip");
    }
}

#[test]
fn rsa_oaep_is_not_implemented() {
    let err = Pipeline::new()
        .encrypt("hi", "pw", CipherAlgorithm::RsaOaep, cheap())
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotImplemented);
}

#[test]
fn rsa_oaep_record_fails_before_derivation() {
    let record = seal("asymmetric", "pw", CipherAlgorithm::Aes256Gcm);
    let rsa = edit_record(&record, |v| {
        v["algorithm"] = Value::String("RSA-OAEP".into());
        v["nonce"] = Value::String(String::new());
    });
    assert_eq!(
        format::decode(&rsa).unwrap().algorithm(),
        CipherAlgorithm::RsaOaep
    );

    let stages = Mutex::new(Vec::new());
    let observer = |p: &Progress| stages.lock().unwrap().push(p.stage);
    let err = Pipeline::new()
        .decrypt_with(&rsa, "pw", Hooks::default().with_observer(&observer))
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::NotImplemented);
    assert_eq!(*stages.lock().unwrap(), vec![Stage::Preparing, Stage::Failed]);
}

#[test]
fn oversized_scrypt_parallelism_is_rejected_before_derivation() {
    let record = seal("hostile", "pw", CipherAlgorithm::Aes256Gcm);
    let hostile = edit_record(&record, |v| {
        let salt = v["kdf"]["salt"].clone();
        v["kdf"] = serde_json::json!({
            "algorithm": "scrypt",
            "salt": salt,
            "n": 2, "r": 1, "p": 536_870_911u32,
            "keyLength": 32
        });
    });
    assert_eq!(decrypt_kind(&hostile, "pw"), ErrorKind::MalformedBundle);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn roundtrip_any_message(
        message in "\\PC{1,200}",
        password in "\\PC{1,32}",
        chacha in any::<bool>(),
    ) {
        let algorithm = if chacha {
            CipherAlgorithm::ChaCha20Poly1305
        } else {
            CipherAlgorithm::Aes256Gcm
        };
        let pipeline = Pipeline::new();
        let sealed = pipeline.encrypt(&message, &password, algorithm, cheap()).unwrap();
        let opened = pipeline.decrypt(sealed.record(), &password).unwrap();

        prop_assert_eq!(opened.plaintext(), message.as_str());
        prop_assert_eq!(sealed.bundle().plaintext_len(), message.len());
    }
}
