//! Integration tests for materializing attachments into the store.

mod common;

use common::{FakeMailbox, FakeMessage, Workspace};
use mailtext::sync::ledger::ProcessedLedger;
use mailtext::sync::source::MailSource;
use mailtext::sync::store::{ArtifactPath, DedupPolicy, qualifying_attachments};
use mailtext::sync::types::{ArtifactKind, MessageId};
use pretty_assertions::assert_eq;

fn mailbox_with_invoice_and_receipt() -> FakeMailbox {
    FakeMailbox::with(vec![FakeMessage::new(
        "m1",
        "Jane Doe <jane@x.com>",
        &[
            ("invoice.pdf", b"%PDF-1.4"),
            ("notes.docx", b"PK"),
            ("receipt.PNG", b"\x89PNG"),
        ],
    )])
}

#[test]
fn test_materialize_downloads_only_allowed_types() {
    let ws = Workspace::new();
    let mut mailbox = mailbox_with_invoice_and_receipt();
    let message = mailbox.fetch(&MessageId::new("m1")).unwrap();
    let ledger = ProcessedLedger::load(&ws.ledger_path());
    let store = ws.store(DedupPolicy::Ledger);

    let result = store.materialize(&message, &mut mailbox, &ledger);

    let names: Vec<&str> = result.items.iter().map(|m| m.artifact.filename()).collect();
    assert_eq!(names, vec!["invoice.pdf", "receipt.PNG"]);
    assert_eq!(result.items[0].kind, ArtifactKind::Pdf);
    assert_eq!(result.items[1].kind, ArtifactKind::Image);
    assert!(result.items.iter().all(|m| m.downloaded));
    assert_eq!(result.failed, 0);
    assert!(!ws.file("Jane_Doe/notes.docx").exists());
    assert_eq!(std::fs::read(ws.file("Jane_Doe/invoice.pdf")).unwrap(), b"%PDF-1.4");
    assert_eq!(std::fs::read(ws.file("Jane_Doe/receipt.PNG")).unwrap(), b"\x89PNG");
}

#[test]
fn test_materialize_twice_file_policy_second_is_empty() {
    let ws = Workspace::new();
    let mut mailbox = mailbox_with_invoice_and_receipt();
    let message = mailbox.fetch(&MessageId::new("m1")).unwrap();
    let ledger = ProcessedLedger::load(&ws.ledger_path());
    let store = ws.store(DedupPolicy::File);

    let first = store.materialize(&message, &mut mailbox, &ledger);
    let second = store.materialize(&message, &mut mailbox, &ledger);

    assert_eq!(first.items.len(), 2);
    assert!(second.is_empty());
    assert_eq!(mailbox.attachment_fetches.len(), 2);
}

#[test]
fn test_materialize_twice_ledger_policy_returns_pending_without_refetch() {
    let ws = Workspace::new();
    let mut mailbox = mailbox_with_invoice_and_receipt();
    let message = mailbox.fetch(&MessageId::new("m1")).unwrap();
    let mut ledger = ProcessedLedger::load(&ws.ledger_path());
    let store = ws.store(DedupPolicy::Ledger);

    store.materialize(&message, &mut mailbox, &ledger);
    let pending = store.materialize(&message, &mut mailbox, &ledger);
    assert_eq!(pending.items.len(), 2);
    assert!(pending.items.iter().all(|m| !m.downloaded));
    assert_eq!(mailbox.attachment_fetches.len(), 2);

    for item in &pending.items {
        ledger.record(&item.artifact).unwrap();
    }
    assert!(store.materialize(&message, &mut mailbox, &ledger).is_empty());
    assert_eq!(mailbox.attachment_fetches.len(), 2);
}

#[test]
fn test_materialize_isolates_failed_download() {
    let ws = Workspace::new();
    let mut mailbox = mailbox_with_invoice_and_receipt();
    mailbox
        .failing_attachments
        .insert(("m1".to_string(), "invoice.pdf".to_string()));
    let message = mailbox.fetch(&MessageId::new("m1")).unwrap();
    let ledger = ProcessedLedger::load(&ws.ledger_path());
    let store = ws.store(DedupPolicy::Ledger);

    let result = store.materialize(&message, &mut mailbox, &ledger);

    assert_eq!(result.failed, 1);
    assert_eq!(result.items.len(), 1);
    assert_eq!(result.items[0].artifact.filename(), "receipt.PNG");
    assert!(!ws.file("Jane_Doe/invoice.pdf").exists());
}

#[test]
fn test_materialize_without_qualifying_attachments_touches_nothing() {
    let ws = Workspace::new();
    let mut mailbox = FakeMailbox::with(vec![FakeMessage::new(
        "m1",
        "Jane Doe <jane@x.com>",
        &[("slides.pptx", b"PK")],
    )]);
    let message = mailbox.fetch(&MessageId::new("m1")).unwrap();
    let ledger = ProcessedLedger::load(&ws.ledger_path());

    let result = ws
        .store(DedupPolicy::Ledger)
        .materialize(&message, &mut mailbox, &ledger);

    assert!(result.is_empty());
    assert_eq!(result.failed, 0);
    assert!(mailbox.attachment_fetches.is_empty());
    assert!(!ws.store_root().exists());
}

#[test]
fn test_existing_file_is_never_overwritten_by_download() {
    let ws = Workspace::new();
    let store = ws.store(DedupPolicy::File);
    let artifact = ArtifactPath::new("Jane_Doe", "invoice.pdf").unwrap();
    store.write_new(&artifact, b"original").unwrap();

    let mut mailbox = mailbox_with_invoice_and_receipt();
    let message = mailbox.fetch(&MessageId::new("m1")).unwrap();
    let ledger = ProcessedLedger::load(&ws.ledger_path());
    let result = store.materialize(&message, &mut mailbox, &ledger);

    let names: Vec<&str> = result.items.iter().map(|m| m.artifact.filename()).collect();
    assert_eq!(names, vec!["receipt.PNG"]);
    assert_eq!(std::fs::read(ws.file("Jane_Doe/invoice.pdf")).unwrap(), b"original");
    assert_eq!(mailbox.fetches_of("invoice.pdf"), 0);
}

#[test]
fn test_attachment_filename_with_directories_stays_inside_sender_dir() {
    let ws = Workspace::new();
    let mut mailbox = FakeMailbox::with(vec![FakeMessage::new(
        "m1",
        "../../Mallory <m@evil.example>",
        &[("../../../outside.pdf", b"%PDF")],
    )]);
    let message = mailbox.fetch(&MessageId::new("m1")).unwrap();
    let ledger = ProcessedLedger::load(&ws.ledger_path());

    let result = ws
        .store(DedupPolicy::Ledger)
        .materialize(&message, &mut mailbox, &ledger);

    assert_eq!(result.items.len(), 1);
    let artifact = &result.items[0].artifact;
    assert_eq!(artifact.filename(), "outside.pdf");
    assert!(!artifact.sender().contains('/'));
    assert!(ws.store_root().join(artifact.sender()).join("outside.pdf").exists());
    assert!(!ws.tmp.path().join("outside.pdf").exists());
}

#[test]
fn test_qualifying_attachments_collapse_duplicate_names() {
    let mut mailbox = FakeMailbox::with(vec![FakeMessage::new(
        "m1",
        "Jane Doe <jane@x.com>",
        &[("scan.png", b"a"), ("scan.png", b"b"), ("scan.pdf", b"c")],
    )]);
    let message = mailbox.fetch(&MessageId::new("m1")).unwrap();

    let keys: Vec<String> = qualifying_attachments(&message)
        .into_iter()
        .map(|(_, artifact, _)| artifact.key())
        .collect();

    assert_eq!(keys, vec!["Jane_Doe/scan.png", "Jane_Doe/scan.pdf"]);
}
