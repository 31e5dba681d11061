//! Proof validation and discovery behavior through the request path.

use std::time::Duration;
use wopi_protocol::{Operation, Timestamp, HEADER_PROOF};
use wopi_server::{PolicyConfig, ServerConfig};
use wopi_testkit::prelude::*;

fn proofed_host() -> TestHost {
    let host = TestHost::with_policy(PolicyConfig::default().with_proof_validation(true));
    host.insert("doc-1", "Plan.docx", b"hello".to_vec());
    host
}

#[test]
fn unsigned_request_is_rejected() {
    let host = proofed_host();
    assert_eq!(host.check_file_info("doc-1").status, 401);
}

#[test]
fn current_key_signature_is_accepted() {
    let host = proofed_host();
    let request = host.sign(host.request(Operation::GetFile, "doc-1"), ProofKeyPair::current());
    let response = host.send(&request);
    assert_eq!(response.status, 200);
    assert_eq!(response.body.to_bytes(), b"hello");
}

#[test]
fn previous_key_signature_is_accepted() {
    let host = proofed_host();
    let request = host.sign(host.request(Operation::CheckFileInfo, "doc-1"), ProofKeyPair::previous());
    assert_eq!(host.send(&request).status, 200);
}

#[test]
fn old_proof_from_current_key_is_accepted() {
    // Client has rotated to a key the cached discovery does not know yet.
    let host = proofed_host();
    let request = host.request(Operation::CheckFileInfo, "doc-1");
    let request = host.sign(request, ProofKeyPair::unrelated());
    let request = host.sign_old(request, ProofKeyPair::current());
    assert_eq!(host.send(&request).status, 200);
}

#[test]
fn unrelated_key_is_rejected() {
    let host = proofed_host();
    let request = host.request(Operation::CheckFileInfo, "doc-1");
    let request = host.sign(request, ProofKeyPair::unrelated());
    let request = host.sign_old(request, ProofKeyPair::unrelated());
    assert_eq!(host.send(&request).status, 401);
}

#[test]
fn tampered_proof_is_rejected() {
    let host = proofed_host();
    let request = host
        .sign(host.request(Operation::CheckFileInfo, "doc-1"), ProofKeyPair::current())
        .with_header(HEADER_PROOF, "bm90IGEgc2lnbmF0dXJl");
    assert_eq!(host.send(&request).status, 401);
}

#[test]
fn signature_for_another_url_is_rejected() {
    let host = proofed_host();
    host.insert("doc-2", "Other.docx", Vec::new());
    let signed = host.sign(host.request(Operation::CheckFileInfo, "doc-2"), ProofKeyPair::current());
    let replayed = host.request(Operation::CheckFileInfo, "doc-1").with_header(
        HEADER_PROOF,
        signed.headers.get(HEADER_PROOF).unwrap(),
    );
    let replayed = replayed.with_header(
        wopi_protocol::HEADER_TIMESTAMP,
        signed.headers.get(wopi_protocol::HEADER_TIMESTAMP).unwrap(),
    );
    assert_eq!(host.send(&replayed).status, 401);
}

#[test]
fn timestamp_outside_skew_is_rejected() {
    let host = proofed_host();
    let stale = Timestamp::from_datetime(test_epoch() - chrono::Duration::minutes(21));
    let request = host.sign_at(
        host.request(Operation::CheckFileInfo, "doc-1"),
        ProofKeyPair::current(),
        stale,
    );
    assert_eq!(host.send(&request).status, 401);

    let recent = Timestamp::from_datetime(test_epoch() - chrono::Duration::minutes(19));
    let request = host.sign_at(
        host.request(Operation::CheckFileInfo, "doc-1"),
        ProofKeyPair::current(),
        recent,
    );
    assert_eq!(host.send(&request).status, 200);
}

#[test]
fn proofs_are_ignored_when_validation_is_off() {
    let host = TestHost::new();
    host.insert("doc-1", "Plan.docx", Vec::new());
    assert_eq!(host.check_file_info("doc-1").status, 200);
}

#[test]
fn unreachable_discovery_is_transient() {
    let host = proofed_host();
    host.fetcher.set_failure("connection refused");
    let request = host.sign(host.request(Operation::CheckFileInfo, "doc-1"), ProofKeyPair::current());
    assert_eq!(host.send(&request).status, 503);

    host.fetcher.set_document(
        DiscoveryBuilder::office_defaults()
            .with_proof_keys(ProofKeyPair::current(), None)
            .build(),
    );
    assert_eq!(host.send(&request).status, 200);
}

#[test]
fn stale_discovery_survives_a_failed_refresh() {
    let host = TestHost::with_config(
        ServerConfig::new(PolicyConfig::default().with_proof_validation(true))
            .with_discovery_url(TEST_DISCOVERY_URL)
            .with_server_url(TEST_HOST_URL)
            .with_discovery_ttl(Duration::ZERO),
    );
    host.insert("doc-1", "Plan.docx", Vec::new());
    let request = host.sign(host.request(Operation::CheckFileInfo, "doc-1"), ProofKeyPair::current());

    assert_eq!(host.send(&request).status, 200);
    host.fetcher.set_failure("connection reset");
    assert_eq!(host.send(&request).status, 200);
    assert!(host.fetcher.fetch_count() >= 2);
}

#[test]
fn rotated_keys_take_effect_after_refresh() {
    let host = TestHost::with_config(
        ServerConfig::new(PolicyConfig::default().with_proof_validation(true))
            .with_discovery_url(TEST_DISCOVERY_URL)
            .with_server_url(TEST_HOST_URL)
            .with_discovery_ttl(Duration::ZERO),
    );
    host.insert("doc-1", "Plan.docx", Vec::new());

    host.fetcher.set_document(
        DiscoveryBuilder::office_defaults()
            .with_proof_keys(ProofKeyPair::unrelated(), Some(ProofKeyPair::current()))
            .build(),
    );
    let request = host.sign(host.request(Operation::CheckFileInfo, "doc-1"), ProofKeyPair::unrelated());
    assert_eq!(host.send(&request).status, 200);

    let request = host.sign(host.request(Operation::CheckFileInfo, "doc-1"), ProofKeyPair::previous());
    assert_eq!(host.send(&request).status, 401);
}
