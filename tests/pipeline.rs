//! Service-level tests: the ingest and ask workflows without HTTP.

mod common;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use common::{pdf_with_pages, prose, ContextBoundChat, HashingEmbedder, TestEnv};
use docqa::index::VectorIndex;
use docqa::models::UploadedFile;
use docqa::Error;

#[tokio::test]
async fn test_index_survives_service_restart() {
    let env = TestEnv::new(0);
    let pdf = pdf_with_pages(&[&prose("compass", 2000)]);

    let report = env
        .service(Arc::new(ContextBoundChat::default()))
        .ingest(vec![UploadedFile::new("compass.pdf", pdf)])
        .await
        .unwrap();
    assert_eq!(report.status, "PDF processed");

    let restarted = env.service(Arc::new(ContextBoundChat::default()));
    let response = restarted.ask("Where is compass11?").await.unwrap();
    assert!(response.context.contains("compass"));

    let index = VectorIndex::load(&env.index_path(), &HashingEmbedder).unwrap();
    assert_eq!(index.len(), report.num_chunks);
}

#[tokio::test]
async fn test_text_files_are_ingested() {
    let env = TestEnv::new(0);
    let service = env.service(Arc::new(ContextBoundChat::default()));

    let report = service
        .ingest(vec![UploadedFile::new(
            "notes.md",
            b"# Notes\n\nThe lighthouse keeper logs the weather.".to_vec(),
        )])
        .await
        .unwrap();
    assert_eq!(report.num_chunks, 1);

    let response = service.ask("Who logs the weather?").await.unwrap();
    assert!(response.context.contains("lighthouse keeper"));
}

#[tokio::test]
async fn test_empty_upload_list_is_rejected() {
    let env = TestEnv::new(0);
    let service = env.service(Arc::new(ContextBoundChat::default()));

    let err = service.ingest(Vec::new()).await.unwrap_err();
    assert!(matches!(err, Error::Validation(_)));
}

#[tokio::test]
async fn test_blank_question_is_rejected_before_loading() {
    let env = TestEnv::new(0);
    let chat = Arc::new(ContextBoundChat::default());
    let service = env.service(Arc::clone(&chat));

    let err = service.ask("  \n").await.unwrap_err();
    assert!(matches!(err, Error::Validation(_)));
    assert!(chat.prompts.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_document_without_text_is_rejected() {
    let env = TestEnv::new(0);
    let service = env.service(Arc::new(ContextBoundChat::default()));

    let err = service
        .ingest(vec![UploadedFile::new("blank.pdf", pdf_with_pages(&[""]))])
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Embedding(_)), "got {:?}", err);
    assert!(!env.index_path().exists());
}

#[tokio::test]
async fn test_later_files_follow_earlier_ones() {
    let env = TestEnv::new(0);
    let service = env.service(Arc::new(ContextBoundChat::default()));

    service
        .ingest(vec![
            UploadedFile::new("a.txt", b"alpha segment text".to_vec()),
            UploadedFile::new("b.txt", b"bravo segment text".to_vec()),
        ])
        .await
        .unwrap();

    let index = VectorIndex::load(&env.index_path(), &HashingEmbedder).unwrap();
    assert_eq!(
        index.segments(),
        &["alpha segment text".to_string(), "bravo segment text".to_string()]
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_asks_during_reingest_see_one_whole_index() {
    let env = TestEnv::new(0);
    let service = Arc::new(env.service(Arc::new(ContextBoundChat::default())));
    let docs = [
        ("north.txt", prose("north", 2400)),
        ("south.txt", prose("south", 2400)),
    ];
    service
        .ingest(vec![UploadedFile::new(docs[0].0, docs[0].1.clone())])
        .await
        .unwrap();

    let done = Arc::new(AtomicBool::new(false));
    let writer = {
        let service = Arc::clone(&service);
        let done = Arc::clone(&done);
        tokio::spawn(async move {
            for round in 0..40 {
                let (name, text) = &docs[round % 2];
                service
                    .ingest(vec![UploadedFile::new(*name, text.clone())])
                    .await
                    .unwrap();
            }
            done.store(true, Ordering::SeqCst);
        })
    };

    let mut readers = Vec::new();
    for _ in 0..3 {
        let service = Arc::clone(&service);
        let done = Arc::clone(&done);
        readers.push(tokio::spawn(async move {
            let mut asks = 0;
            loop {
                let response = service
                    .ask("Where are north7 and south7?")
                    .await
                    .unwrap_or_else(|e| panic!("ask {} failed mid-ingest: {}", asks, e));
                let north = response.context.contains("north");
                let south = response.context.contains("south");
                assert!(
                    north != south,
                    "context should come from exactly one document: {:?}",
                    response.context
                );
                asks += 1;
                if done.load(Ordering::SeqCst) {
                    break;
                }
            }
            asks
        }));
    }

    writer.await.unwrap();
    for reader in readers {
        assert!(reader.await.unwrap() > 0);
    }
}
