//! Tamper-evidence across the whole stack: sealed artifacts, per-user
//! chains through the store, and the hash-chained audit ledger.

use assent_evidence::artifact::{
    seal_artifact, verify_artifact, ArtifactContent, DecisionMap, InteractionMetadata,
};
use assent_evidence::chain::{verify_chain, ChainError, GENESIS_HASH};
use assent_evidence::crypto::id::{HmacSigner, Signer};
use assent_evidence::ledger::{AuditAction, AuditLedger, NewAuditEntry};
use assent_evidence::store::{ArtifactStore, MemoryArtifactStore, MemoryAuditLedger};
use chrono::{TimeZone, Utc};

fn content(seq: i64, granted: bool) -> ArtifactContent {
    let mut decisions = DecisionMap::new();
    decisions.insert("P-001".into(), granted);
    ArtifactContent {
        requirement_id: format!("req-{seq}"),
        user_id: "user-1".into(),
        decisions,
        metadata: InteractionMetadata {
            ip_address: "203.0.113.7".into(),
            user_agent: "test/1.0".into(),
            session_id: format!("sess-{seq}"),
            captured_at: Utc.timestamp_opt(1_700_000_000 + seq, 0).unwrap(),
        },
        sealed_at: Utc.timestamp_opt(1_700_000_000 + seq, 0).unwrap(),
    }
}

#[tokio::test]
async fn chain_built_through_the_store_verifies_end_to_end() {
    let store = MemoryArtifactStore::new();
    let signer = HmacSigner::new(b"chain-key".to_vec());

    for seq in 0..5 {
        let (index, previous) = match store.head("user-1").await.unwrap() {
            Some(head) => (head.block_index + 1, head.head_hash),
            None => (0, GENESIS_HASH.to_string()),
        };
        let artifact =
            seal_artifact(content(seq, seq % 2 == 0), index, previous, &signer).unwrap();
        store.append(artifact).await.unwrap();
    }

    let chain = store.chain("user-1").await.unwrap();
    assert_eq!(chain.len(), 5);
    verify_chain(&chain).unwrap();

    for artifact in &chain {
        assert!(verify_artifact(artifact, &signer).unwrap());
    }
}

#[tokio::test]
async fn flipping_a_sealed_decision_is_detected() {
    let signer = HmacSigner::new(b"chain-key".to_vec());
    let mut artifact =
        seal_artifact(content(0, false), 0, GENESIS_HASH.to_string(), &signer).unwrap();
    assert!(verify_artifact(&artifact, &signer).unwrap());

    // An attacker rewrites a refusal into a grant after sealing
    artifact.decisions.insert("P-001".into(), true);
    assert!(!verify_artifact(&artifact, &signer).unwrap());
}

#[tokio::test]
async fn removing_a_middle_artifact_breaks_the_chain() {
    let signer = HmacSigner::new(b"chain-key".to_vec());
    let mut chain = Vec::new();
    let mut previous = GENESIS_HASH.to_string();
    for seq in 0..4 {
        let artifact =
            seal_artifact(content(seq, true), seq as u64, previous, &signer).unwrap();
        previous = artifact.content_hash.clone();
        chain.push(artifact);
    }
    verify_chain(&chain).unwrap();

    chain.remove(2);
    assert!(matches!(
        verify_chain(&chain),
        Err(ChainError::NonContiguous { .. })
    ));
}

#[tokio::test]
async fn ledger_detects_a_rewritten_entry() {
    let ledger = MemoryAuditLedger::new();
    for seq in 0..3 {
        ledger
            .append(NewAuditEntry {
                actor: "user-1".into(),
                action: AuditAction::ConsentGranted,
                resource: format!("req-{seq}"),
                old_status: Some("pending".into()),
                new_status: Some("granted".into()),
                reason: "initial_grant".into(),
                details: serde_json::json!({}),
                at: Utc.timestamp_opt(1_700_000_000 + seq, 0).unwrap(),
            })
            .await
            .unwrap();
    }
    ledger.verify().await.unwrap();

    // Entries are verifiable individually, so a consumer holding an
    // exported trail can recheck it offline
    let mut exported = ledger.entries().await.unwrap();
    exported[1].new_status = Some("withdrawn".into());
    assert!(!exported[1].verify().unwrap());
    // And the forward link from the untouched successor still pins the
    // original bytes
    assert_eq!(exported[2].prev_hash, ledger.entries().await.unwrap()[1].entry_hash);
}

#[tokio::test]
async fn signature_binds_the_artifact_to_the_signing_key() {
    let signer = HmacSigner::new(b"operator-a".to_vec());
    let other = HmacSigner::new(b"operator-b".to_vec());
    assert_ne!(signer.key_id(), other.key_id());

    let artifact = seal_artifact(content(0, true), 0, GENESIS_HASH.to_string(), &signer).unwrap();
    assert!(verify_artifact(&artifact, &signer).unwrap());
    assert!(!verify_artifact(&artifact, &other).unwrap());
}
