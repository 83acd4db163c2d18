//! End-to-end: encrypt and share a file, then present tags until it is
//! reconstructed. Everything runs against an in-memory OpenDAL operator.

use std::sync::Arc;

use async_trait::async_trait;
use opendal::Operator;

use nfcs_core::config::KeyMode;
use nfcs_core::{AccessAction, ContentEncoding, KeyProtection, NfcsError, NfcsResult};
use nfcs_share::{
    AuthorizedUser, EncryptOrchestrator, EncryptRequest, EncryptStage, FileStatus, Reassembler,
    SourceFile, Stores, TagMatchSession,
};
use nfcs_storage::{BlobStore, OpendalBlobStore};

const BASE_URL: &str = "memory://nfcs";

fn memory_operator() -> Operator {
    nfcs_storage::build_memory_operator().expect("memory operator")
}

fn request(name: &str, mime: &str, bytes: &[u8], users: &[(&str, &str)]) -> EncryptRequest {
    EncryptRequest {
        file: SourceFile {
            name: name.into(),
            mime: mime.into(),
            bytes: bytes.to_vec(),
        },
        creator: "owner@example.com".into(),
        users: users
            .iter()
            .map(|(email, tag)| AuthorizedUser::new(*email, *tag))
            .collect(),
        partition_count: users.len(),
        key_mode: KeyMode::Plain,
    }
}

#[tokio::test]
async fn text_file_roundtrip_tags_in_any_order() {
    let stores = Stores::from_operator(memory_operator(), BASE_URL);
    let original = b"Quarterly report: revenue up, costs down, nothing to see here.";

    let mut orchestrator = EncryptOrchestrator::new(stores.clone());
    let record = orchestrator
        .encrypt_and_share(request(
            "report.txt",
            "text/plain",
            original,
            &[("a@x.com", "04:A2:19:7F"), ("b@x.com", "04:B3:88:10")],
        ))
        .await
        .expect("encrypt should succeed");

    assert_eq!(orchestrator.stage(), EncryptStage::Complete);
    assert_eq!(record.partitions.len(), 2);
    assert_eq!(record.content_encoding, Some(ContentEncoding::Text));
    assert!(record.partitions[0].url.starts_with("memory://nfcs/encrypted/owner@example.com/"));
    assert!(record.partitions[1].url.ends_with("/report_part1.txt"));

    let records = stores.records.list().await.unwrap();
    assert_eq!(records.len(), 1);

    let reassembler = Reassembler::new(&stores);
    let mut session = TagMatchSession::new("a@x.com", records);

    // second partition's tag first
    assert!(reassembler.submit_tag(&mut session, "04:B3:88:10").await.is_empty());
    let progress = session.file(&record.id).unwrap();
    assert_eq!((progress.verified_count(), progress.total()), (1, 2));
    assert!(!progress.user_partition_verified("a@x.com"));

    let outcomes = reassembler.submit_tag(&mut session, "04:A2:19:7F").await;
    assert_eq!(outcomes.len(), 1);
    assert_eq!(outcomes[0].file_name, "report.txt");
    assert_eq!(outcomes[0].result.as_ref().unwrap(), original);
    assert_eq!(session.file(&record.id).unwrap().status(), FileStatus::Reconstructed);

    // presenting a verifying tag again does not reconstruct again
    assert!(reassembler.submit_tag(&mut session, "04:A2:19:7F").await.is_empty());

    let logs = stores.logs.list().await.unwrap();
    assert_eq!(logs.len(), 2);
    assert!(logs.iter().any(|l| l.action == AccessAction::Encrypted
        && l.user == "owner@example.com"));
    assert!(logs.iter().any(|l| l.action == AccessAction::Reconstructed
        && l.user == "a@x.com"
        && l.file_id == record.id));
}

#[tokio::test]
async fn binary_file_roundtrip() {
    let stores = Stores::from_operator(memory_operator(), BASE_URL);
    let original: Vec<u8> = (0u8..=255).cycle().take(4096).collect();

    let record = EncryptOrchestrator::new(stores.clone())
        .encrypt_and_share(request(
            "photo.png",
            "image/png",
            &original,
            &[("a@x", "T1"), ("b@x", "T2"), ("c@x", "T3")],
        ))
        .await
        .unwrap();
    assert_eq!(record.content_encoding, Some(ContentEncoding::Base64));
    assert!(record.content_hash.is_some());

    let reassembler = Reassembler::new(&stores);
    let mut session = TagMatchSession::new("c@x", stores.records.list().await.unwrap());
    for tag in ["T3", "T1"] {
        assert!(reassembler.submit_tag(&mut session, tag).await.is_empty());
    }
    let outcomes = reassembler.submit_tag(&mut session, "T2").await;
    assert_eq!(outcomes[0].result.as_ref().unwrap(), &original);
}

#[tokio::test]
async fn unknown_and_partial_tags_never_reconstruct() {
    let stores = Stores::from_operator(memory_operator(), BASE_URL);
    EncryptOrchestrator::new(stores.clone())
        .encrypt_and_share(request(
            "notes.md",
            "text/markdown",
            b"# notes\n\nsome markdown",
            &[("a@x", "T1"), ("b@x", "T2"), ("c@x", "T3")],
        ))
        .await
        .unwrap();

    let reassembler = Reassembler::new(&stores);
    let mut session = TagMatchSession::new("a@x", stores.records.list().await.unwrap());
    for tag in ["UNKNOWN", "", "T1", "T2", "T2", "  "] {
        assert!(reassembler.submit_tag(&mut session, tag).await.is_empty());
    }
    let file = session.files().next().unwrap();
    assert_eq!(file.verified_count(), 2);
    assert_eq!(file.status(), FileStatus::Pending);

    // nothing but the encryption was logged
    assert_eq!(stores.logs.list().await.unwrap().len(), 1);
}

#[tokio::test]
async fn other_principals_do_not_see_the_file() {
    let stores = Stores::from_operator(memory_operator(), BASE_URL);
    EncryptOrchestrator::new(stores.clone())
        .encrypt_and_share(request("a.txt", "text/plain", b"abcdef", &[("a@x", "T1"), ("b@x", "T2")]))
        .await
        .unwrap();

    let session = TagMatchSession::new("owner@example.com", stores.records.list().await.unwrap());
    assert!(session.is_empty());
}

/// Blob store that refuses every upload of one partition index
struct FlakyBlobStore {
    inner: OpendalBlobStore,
    fail_part: u32,
}

#[async_trait]
impl BlobStore for FlakyBlobStore {
    async fn upload(&self, path: &str, data: Vec<u8>) -> NfcsResult<String> {
        if path.ends_with(&format!("_part{}.txt", self.fail_part)) {
            return Err(NfcsError::Storage(format!("injected failure for {path}")));
        }
        self.inner.upload(path, data).await
    }

    async fn fetch(&self, url: &str) -> NfcsResult<Vec<u8>> {
        self.inner.fetch(url).await
    }

    async fn remove_prefix(&self, prefix: &str) -> NfcsResult<()> {
        self.inner.remove_prefix(prefix).await
    }
}

/// Paths of every stored blob, at any depth.
async fn stored_blobs(op: &Operator) -> Vec<String> {
    op.list_with("encrypted/")
        .recursive(true)
        .await
        .unwrap_or_default()
        .into_iter()
        .filter(|e| e.metadata().is_file())
        .map(|e| e.path().to_string())
        .collect()
}

#[tokio::test]
async fn failed_upload_writes_no_record() {
    let op = memory_operator();
    let mut stores = Stores::from_operator(op.clone(), BASE_URL);
    stores.blobs = Arc::new(FlakyBlobStore {
        inner: OpendalBlobStore::new(op.clone(), BASE_URL),
        fail_part: 2,
    });

    let mut orchestrator = EncryptOrchestrator::new(stores.clone());
    let err = orchestrator
        .encrypt_and_share(request(
            "report.txt",
            "text/plain",
            b"this upload will not complete",
            &[("a@x", "T1"), ("b@x", "T2"), ("c@x", "T3")],
        ))
        .await
        .unwrap_err();

    assert!(matches!(err, NfcsError::Storage(_)));
    assert_eq!(orchestrator.stage(), EncryptStage::Idle);
    assert!(stores.records.list().await.unwrap().is_empty());
    assert!(stores.logs.list().await.unwrap().is_empty());
    // partitions that did upload were cleaned up with the batch
    assert_eq!(stored_blobs(&op).await, Vec::<String>::new());
}

#[tokio::test]
async fn invalid_requests_fail_before_any_upload() {
    let op = memory_operator();
    let stores = Stores::from_operator(op.clone(), BASE_URL);
    let mut orchestrator = EncryptOrchestrator::new(stores.clone());

    let mut wrong_count = request("r.txt", "text/plain", b"abcdef", &[("a@x", "T1"), ("b@x", "T2")]);
    wrong_count.partition_count = 3;
    let too_short = request("r.txt", "text/plain", b"ab", &[("a@x", "T1"), ("b@x", "T2"), ("c@x", "T3")]);
    let bad_utf8 = request("r.txt", "text/plain", &[0xff, 0xfe, 0x00], &[("a@x", "T1"), ("b@x", "T2")]);

    for req in [wrong_count, too_short, bad_utf8] {
        let err = orchestrator.encrypt_and_share(req).await.unwrap_err();
        assert!(matches!(err, NfcsError::Validation(_)), "got {err:?}");
        assert_eq!(orchestrator.stage(), EncryptStage::Idle);
    }

    assert!(stores.records.list().await.unwrap().is_empty());
    assert!(op.list("encrypted/").await.map(|e| e.is_empty()).unwrap_or(true));
}

#[tokio::test]
async fn progress_callback_sees_every_stage() {
    let stores = Stores::from_operator(memory_operator(), BASE_URL);
    let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
    let sink = seen.clone();

    EncryptOrchestrator::new(stores)
        .with_progress(Box::new(move |stage, pct| sink.lock().unwrap().push((stage, pct))))
        .encrypt_and_share(request("r.txt", "text/plain", b"abcdef", &[("a@x", "T1"), ("b@x", "T2")]))
        .await
        .unwrap();

    let seen = seen.lock().unwrap();
    let percents: Vec<u8> = seen.iter().map(|(_, p)| *p).collect();
    assert_eq!(percents, [20, 40, 60, 80, 100]);
    assert_eq!(seen.last().unwrap().0, EncryptStage::Complete);
}

#[tokio::test]
async fn re_encrypting_same_file_keeps_both_records_readable() {
    let stores = Stores::from_operator(memory_operator(), BASE_URL);
    let mut orchestrator = EncryptOrchestrator::new(stores.clone());
    let users = [("a@x", "T1"), ("b@x", "T2")];

    let first = orchestrator
        .encrypt_and_share(request("r.txt", "text/plain", b"first version", &users))
        .await
        .unwrap();
    let second = orchestrator
        .encrypt_and_share(request("r.txt", "text/plain", b"second version", &users))
        .await
        .unwrap();
    assert_ne!(first.partitions[0].url, second.partitions[0].url);

    let reassembler = Reassembler::new(&stores);
    let mut session = TagMatchSession::new("a@x", stores.records.list().await.unwrap());
    reassembler.submit_tag(&mut session, "T1").await;
    let mut outcomes = reassembler.submit_tag(&mut session, "T2").await;
    outcomes.sort_by(|a, b| a.result.as_ref().unwrap().cmp(b.result.as_ref().unwrap()));

    assert_eq!(outcomes.len(), 2);
    assert_eq!(outcomes[0].result.as_ref().unwrap(), b"first version");
    assert_eq!(outcomes[1].result.as_ref().unwrap(), b"second version");
}

#[tokio::test]
async fn tag_wrapped_records_hide_keys_and_tags() {
    let stores = Stores::from_operator(memory_operator(), BASE_URL);
    let mut req = request("secret.txt", "text/plain", b"wrapped under the tag", &[("a@x", "T1"), ("b@x", "T2")]);
    req.key_mode = KeyMode::TagWrapped;

    let record = EncryptOrchestrator::new(stores.clone())
        .encrypt_and_share(req)
        .await
        .unwrap();
    for p in &record.partitions {
        assert!(matches!(p.key_protection, KeyProtection::TagWrapped { .. }));
        assert!(!p.nfc_id.starts_with('T'));
    }

    let reassembler = Reassembler::new(&stores);
    let mut session = TagMatchSession::new("b@x", stores.records.list().await.unwrap());
    reassembler.submit_tag(&mut session, "T2").await;
    let outcomes = reassembler.submit_tag(&mut session, "T1").await;
    assert_eq!(outcomes[0].result.as_ref().unwrap(), b"wrapped under the tag");
}

#[tokio::test]
async fn out_of_order_partition_arrays_reassemble_by_part_index() {
    let original = b"0123456789 abcdefghij ABCDEFGHIJ klmnopqrst KLMNOPQRST uvwxyz";
    let users = [
        ("a@x", "T0"),
        ("b@x", "T1"),
        ("c@x", "T2"),
        ("d@x", "T3"),
        ("e@x", "T4"),
    ];

    for key_mode in [KeyMode::Plain, KeyMode::TagWrapped] {
        let op = memory_operator();
        let stores = Stores::from_operator(op.clone(), BASE_URL);
        let mut req = request("order.txt", "text/plain", original, &users);
        req.key_mode = key_mode;
        let record = EncryptOrchestrator::new(stores.clone())
            .encrypt_and_share(req)
            .await
            .unwrap();
        assert_eq!(stored_blobs(&op).await.len(), 5);

        // rewrite the stored document with its partitions reversed, then
        // the first two swapped: [3, 4, 2, 1, 0]
        let path = format!("records/{}.json", record.id);
        let mut doc: serde_json::Value =
            serde_json::from_slice(&op.read(&path).await.unwrap().to_vec()).unwrap();
        let parts = doc["partitions"].as_array_mut().unwrap();
        parts.reverse();
        parts.swap(0, 1);
        op.write(&path, serde_json::to_vec(&doc).unwrap()).await.unwrap();

        let stored = stores.records.get(&record.id).await.unwrap();
        let order: Vec<u32> = stored.partitions.iter().map(|p| p.part_index).collect();
        assert_eq!(order, [3, 4, 2, 1, 0]);

        let reassembler = Reassembler::new(&stores);
        let mut session = TagMatchSession::new("c@x", vec![stored]);
        for tag in ["T4", "T0", "T3", "T1"] {
            assert!(reassembler.submit_tag(&mut session, tag).await.is_empty());
        }
        let outcomes = reassembler.submit_tag(&mut session, "T2").await;
        assert_eq!(outcomes.len(), 1, "{key_mode:?}");
        assert_eq!(outcomes[0].result.as_ref().unwrap(), original, "{key_mode:?}");
    }
}
