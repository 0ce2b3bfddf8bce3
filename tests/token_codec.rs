//! Session-token integration tests (spec.md §4.1): wiring between `Config`'s
//! signing key/TTL and the token codec, exercised the way the service
//! actually uses it rather than as a unit-level round trip.

use metabase::config::Config;
use metabase::ids::token::StreamToken;
use metabase::ids::StreamId;
use metabase::model::RedundancyScheme;
use metabase::ApiError;

fn redundancy() -> RedundancyScheme {
    RedundancyScheme {
        required_shares: 8,
        repair_shares: 9,
        optimal_shares: 10,
        total_shares: 11,
        share_size: 256,
    }
}

fn sample_token(created_at: i64) -> StreamToken {
    StreamToken {
        bucket: "bucket".into(),
        encrypted_object_key: b"key".to_vec(),
        version: 1,
        redundancy: redundancy(),
        created_at,
        expires_at: created_at + 3600,
        stream_id: StreamId::new(),
    }
}

#[test]
fn token_signed_under_one_configs_key_is_rejected_by_another() {
    let config_a = Config::for_tests();
    // `for_tests` uses a fixed signing key, so pick a distinct one explicitly
    // to be certain this isn't accidentally exercising the happy path.
    let mut config_b = Config::for_tests();
    config_b.signing_key = metabase::ids::token::SigningKey::from_bytes([99u8; 32]);

    let now = time::OffsetDateTime::now_utc().unix_timestamp();
    let token = sample_token(now);
    let signed = token.sign(&config_a.signing_key);

    let err = StreamToken::verify(&signed, &config_b.signing_key, config_b.token_ttl).unwrap_err();
    assert!(matches!(err, ApiError::Invalid(_)));
}

#[test]
fn token_older_than_configured_ttl_is_rejected() {
    let config = Config::for_tests();
    let stale_created_at =
        time::OffsetDateTime::now_utc().unix_timestamp() - config.token_ttl.as_secs() as i64 - 5;
    let token = sample_token(stale_created_at);
    let signed = token.sign(&config.signing_key);

    let err = StreamToken::verify(&signed, &config.signing_key, config.token_ttl).unwrap_err();
    assert!(matches!(err, ApiError::Invalid(_)));
}

#[test]
fn token_within_ttl_round_trips_through_configs_key() {
    let config = Config::for_tests();
    let now = time::OffsetDateTime::now_utc().unix_timestamp();
    let token = sample_token(now);
    let signed = token.sign(&config.signing_key);

    let decoded = StreamToken::verify(&signed, &config.signing_key, config.token_ttl).unwrap();
    assert_eq!(decoded.stream_id, token.stream_id);
    assert_eq!(decoded.bucket, token.bucket);
}
