//! Reconstruction failures: tampered or missing blobs mark the file failed,
//! log the attempt, and can be retried without re-presenting tags.

use nfcs_core::config::KeyMode;
use nfcs_core::{AccessAction, NfcsError};
use nfcs_share::{
    reconstruct, AuthorizedUser, EncryptOrchestrator, EncryptRequest, FileStatus, Reassembler,
    SourceFile, Stores, TagMatchSession,
};

const BASE_URL: &str = "memory://nfcs";

async fn shared_file(key_mode: KeyMode) -> (opendal::Operator, Stores, nfcs_core::EncryptedFileRecord) {
    let op = nfcs_storage::build_memory_operator().expect("memory operator");
    let stores = Stores::from_operator(op.clone(), BASE_URL);
    let record = EncryptOrchestrator::new(stores.clone())
        .encrypt_and_share(EncryptRequest {
            file: SourceFile {
                name: "ledger.csv".into(),
                mime: "text/csv".into(),
                bytes: b"date,amount\n2024-01-01,100\n2024-01-02,250\n".to_vec(),
            },
            creator: "owner@x".into(),
            users: vec![AuthorizedUser::new("a@x", "T1"), AuthorizedUser::new("b@x", "T2")],
            partition_count: 2,
            key_mode,
        })
        .await
        .expect("encrypt should succeed");
    (op, stores, record)
}

fn blob_path(url: &str) -> String {
    url.strip_prefix("memory://nfcs/").expect("memory url").to_string()
}

#[tokio::test]
async fn tampered_blob_fails_then_retry_succeeds() {
    let (op, stores, record) = shared_file(KeyMode::Plain).await;
    let path = blob_path(&record.partitions[1].url);
    let good = op.read(&path).await.unwrap().to_vec();

    let other_key = nfcs_crypto::generate_partition_key();
    let forged = nfcs_crypto::encrypt_partition(&other_key, "forged").unwrap();
    op.write(&path, forged.into_bytes()).await.unwrap();

    let reassembler = Reassembler::new(&stores);
    let mut session = TagMatchSession::new("a@x", stores.records.list().await.unwrap());
    reassembler.submit_tag(&mut session, "T1").await;
    let outcomes = reassembler.submit_tag(&mut session, "T2").await;

    assert_eq!(outcomes.len(), 1);
    assert!(matches!(outcomes[0].result, Err(NfcsError::Crypto(_))));
    assert_eq!(session.file(&record.id).unwrap().status(), FileStatus::Failed);

    op.write(&path, good).await.unwrap();
    let retried = reassembler.retry(&mut session, &record.id).await.unwrap();
    assert!(retried.result.unwrap().starts_with(b"date,amount"));
    assert_eq!(session.file(&record.id).unwrap().status(), FileStatus::Reconstructed);

    let actions: Vec<AccessAction> = stores
        .logs
        .list()
        .await
        .unwrap()
        .into_iter()
        .map(|l| l.action)
        .collect();
    assert!(actions.contains(&AccessAction::ReconstructionFailed));
    assert!(actions.contains(&AccessAction::Reconstructed));
}

#[tokio::test]
async fn missing_blob_is_a_storage_error() {
    let (op, stores, record) = shared_file(KeyMode::Plain).await;
    op.delete(&blob_path(&record.partitions[0].url)).await.unwrap();

    let err = reconstruct(stores.blobs.as_ref(), &record, &[]).await.unwrap_err();
    assert!(matches!(err, NfcsError::Storage(_)), "got {err:?}");
}

#[tokio::test]
async fn retry_is_refused_unless_failed() {
    let (_op, stores, record) = shared_file(KeyMode::Plain).await;
    let reassembler = Reassembler::new(&stores);
    let mut session = TagMatchSession::new("b@x", stores.records.list().await.unwrap());

    assert!(reassembler.retry(&mut session, &record.id).await.is_err());
    assert!(reassembler.retry(&mut session, "unknown").await.is_err());
}

#[tokio::test]
async fn wrapped_keys_need_the_presented_tags() {
    let (_op, stores, record) = shared_file(KeyMode::TagWrapped).await;

    let err = reconstruct(stores.blobs.as_ref(), &record, &[]).await.unwrap_err();
    assert!(matches!(err, NfcsError::Crypto(_)));

    let wrong = [Some("T2".to_string()), Some("T1".to_string())];
    assert!(reconstruct(stores.blobs.as_ref(), &record, &wrong).await.is_err());

    let right = [Some("T1".to_string()), Some("T2".to_string())];
    let bytes = reconstruct(stores.blobs.as_ref(), &record, &right).await.unwrap();
    assert!(bytes.ends_with(b"2024-01-02,250\n"));
}
