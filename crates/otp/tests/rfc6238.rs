//! RFC 6238 Appendix B test vectors and the behaviour 2FA flows rely on.

use test_case::test_case;

use custody_otp::{
    generate_code_at, verify_code_at, HashAlgorithm, OtpError, SharedSecret, TotpGenerator,
    TotpParams,
};

const SHA1_KEY: &[u8] = b"12345678901234567890";
const SHA256_KEY: &[u8] = b"12345678901234567890123456789012";
const SHA512_KEY: &[u8] = b"1234567890123456789012345678901234567890123456789012345678901234";

fn eight_digit(key: &[u8], algorithm: HashAlgorithm) -> TotpGenerator {
    let secret = SharedSecret::from_bytes(key).unwrap();
    let params = TotpParams { digits: 8, algorithm, ..Default::default() };
    TotpGenerator::with_params(&secret, params).unwrap()
}

#[test_case(59, "94287082", "46119246", "90693936" ; "t 59")]
#[test_case(1111111109, "07081804", "68084774", "25091201" ; "t 1111111109")]
#[test_case(1111111111, "14050471", "67062674", "99943326" ; "t 1111111111")]
#[test_case(1234567890, "89005924", "91819424", "93441116" ; "t 1234567890")]
#[test_case(2000000000, "69279037", "90698825", "38618901" ; "t 2000000000")]
#[test_case(20000000000, "65353130", "77737706", "47863826" ; "t 20000000000")]
fn rfc6238_appendix_b(time: u64, sha1: &str, sha256: &str, sha512: &str) {
    assert_eq!(eight_digit(SHA1_KEY, HashAlgorithm::Sha1).generate_at(time), sha1);
    assert_eq!(eight_digit(SHA256_KEY, HashAlgorithm::Sha256).generate_at(time), sha256);
    assert_eq!(eight_digit(SHA512_KEY, HashAlgorithm::Sha512).generate_at(time), sha512);
}

#[test_case(59, "287082")]
#[test_case(1111111109, "081804")]
#[test_case(1111111111, "050471")]
#[test_case(1234567890, "005924")]
#[test_case(2000000000, "279037")]
fn six_digit_codes_from_base32_secret(time: u64, expected: &str) {
    let code = generate_code_at("GEZDGNBVGY3TQOJQGEZDGNBVGY3TQOJQ", time).unwrap();
    assert_eq!(code, expected);
}

#[test]
fn codes_keep_leading_zeros() {
    let code = generate_code_at("GEZDGNBVGY3TQOJQGEZDGNBVGY3TQOJQ", 1234567890).unwrap();
    assert_eq!(code.len(), 6);
    assert!(code.starts_with("00"));
}

#[test]
fn output_is_always_six_ascii_digits() {
    for t in (0..3000u64).map(|i| i * 7919) {
        let code = generate_code_at("JBSWY3DPEHPK3PXP", t).unwrap();
        assert_eq!(code.len(), 6, "t={t}");
        assert!(code.bytes().all(|b| b.is_ascii_digit()), "t={t} code={code}");
    }
}

#[test]
fn frozen_clock_is_deterministic() {
    let first = generate_code_at("JBSWY3DPEHPK3PXP", 1_700_000_000).unwrap();
    for _ in 0..10 {
        assert_eq!(generate_code_at("JBSWY3DPEHPK3PXP", 1_700_000_000).unwrap(), first);
    }
}

#[test]
fn window_boundaries() {
    let step = 1_700_000_010 / 30;
    let start = step * 30;
    let secret = "JBSWY3DPEHPK3PXP";
    assert_eq!(
        generate_code_at(secret, start).unwrap(),
        generate_code_at(secret, start + 29).unwrap()
    );
    assert_ne!(
        generate_code_at(secret, start).unwrap(),
        generate_code_at(secret, start + 30).unwrap()
    );
}

#[test]
fn enrollment_formatting_is_ignored() {
    let t = 1_700_000_000;
    assert_eq!(
        generate_code_at("jbsw y3dp ehpk3pxp", t).unwrap(),
        generate_code_at("JBSWY3DPEHPK3PXP", t).unwrap()
    );
}

#[test]
fn malformed_secret_is_rejected() {
    let err = generate_code_at("12345!!!", 59).unwrap_err();
    assert!(matches!(err, OtpError::InvalidSecret(_)));
}

#[test]
fn generated_code_passes_verifier_in_adjacent_steps() {
    let secret = "JBSWY3DPEHPK3PXP";
    let t = 1_700_000_000;
    let code = generate_code_at(secret, t).unwrap();

    assert!(verify_code_at(secret, &code, t).unwrap());
    assert!(verify_code_at(secret, &code, t + 30).unwrap());
    assert!(verify_code_at(secret, &code, t - 30).unwrap());
    assert!(!verify_code_at(secret, &code, t + 120).unwrap());
}

#[test]
fn superseded_secret_codes_do_not_verify() {
    let old = "JBSWY3DPEHPK3PXP";
    let new = "GEZDGNBVGY3TQOJQGEZDGNBVGY3TQOJQ";
    let t = 1_700_000_000;
    let old_code = generate_code_at(old, t).unwrap();
    let new_code = generate_code_at(new, t).unwrap();

    assert_ne!(old_code, new_code);
    assert!(!verify_code_at(new, &old_code, t).unwrap());
}
