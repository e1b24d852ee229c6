//! Integration tests for the conversion engine and undo manager.
//!
//! Everything runs against temp directories with the built-in converters or
//! small purpose-built registries; no network, no fixtures on disk.
//!
//! Run with:
//!   cargo test --test engine -- --nocapture

use docshift::{
    ConversionEngine, ConversionRequest, ConverterDescriptor, ConverterRegistry, ConverterReport,
    CreditLedger, EngineConfig, EngineConfigBuilder, FailureKind, InMemoryLedger, Phase, ProgressEvent, ProgressHub,
    ProgressSink, UndoError,
};
use futures::StreamExt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

// ── Test helpers ─────────────────────────────────────────────────────────────

/// Route library logs to the test harness; visible with `--nocapture`.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new("docshift=debug"))
        .with_test_writer()
        .try_init();
}

/// French prose in ISO-8859-1; long enough for statistical sniffing.
const LATIN1_MENU: &[u8] = b"Le caf\xe9 de la gare est ferm\xe9 le dimanche. \
Nous servons un plat du jour, une cr\xe8me br\xfbl\xe9e et un th\xe9 glac\xe9.\n\n\
R\xe9servation conseill\xe9e pour les soir\xe9es d'\xe9t\xe9.\n";

#[derive(Default)]
struct Recorder(Mutex<Vec<(Phase, u8)>>);

impl ProgressSink for Recorder {
    fn on_event(&self, event: &ProgressEvent) {
        self.0.lock().unwrap().push((event.phase, event.percent));
    }
}

impl Recorder {
    fn events(&self) -> Vec<(Phase, u8)> {
        self.0.lock().unwrap().clone()
    }
}

struct Harness {
    dir: tempfile::TempDir,
    engine: ConversionEngine,
    ledger: Arc<InMemoryLedger>,
    recorder: Arc<Recorder>,
}

impl Harness {
    fn new(credits: u64) -> Self {
        Self::with_registry(ConverterRegistry::builtin().unwrap(), credits)
    }

    fn with_registry(registry: ConverterRegistry, credits: u64) -> Self {
        Self::with_config(registry, credits, |b, _| b)
    }

    fn with_config(
        registry: ConverterRegistry,
        credits: u64,
        tweak: impl FnOnce(EngineConfigBuilder, &Path) -> EngineConfigBuilder,
    ) -> Self {
        init_tracing();
        let dir = tempfile::tempdir().unwrap();
        let recorder = Arc::new(Recorder::default());
        let ledger = Arc::new(InMemoryLedger::new().with_balance("ana", credits));
        let builder = EngineConfig::builder()
            .work_dir(dir.path().join("state"))
            .progress_sink(recorder.clone() as Arc<dyn ProgressSink>);
        let config = tweak(builder, dir.path()).build().unwrap();
        let engine = ConversionEngine::new(config, Arc::new(registry), ledger.clone());
        Self {
            dir,
            engine,
            ledger,
            recorder,
        }
    }

    fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    fn write(&self, name: &str, bytes: &[u8]) -> PathBuf {
        let p = self.path(name);
        std::fs::write(&p, bytes).unwrap();
        p
    }

    fn request(&self, input: &Path, output: &str, target: &str) -> ConversionRequest {
        ConversionRequest::new(input, self.path(output), target).with_user("ana")
    }

    fn balance(&self) -> u64 {
        self.ledger.balance("ana").unwrap()
    }

    fn journal_is_empty(&self) -> bool {
        let dir = self.dir.path().join("state/journal");
        !dir.exists() || std::fs::read_dir(dir).unwrap().next().is_none()
    }
}

fn tiny_png(path: &Path) {
    let img = image::RgbImage::from_pixel(4, 3, image::Rgb([10, 120, 200]));
    img.save_with_format(path, image::ImageFormat::Png).unwrap();
}

fn tiny_jpg(path: &Path) {
    let img = image::RgbImage::from_pixel(4, 3, image::Rgb([10, 120, 200]));
    img.save_with_format(path, image::ImageFormat::Jpeg).unwrap();
}

fn registry_of(source: &'static str, target: &'static str, f: docshift::ConverterFn) -> ConverterRegistry {
    ConverterRegistry::from_descriptors(&[ConverterDescriptor {
        source,
        target,
        convert: f,
    }])
    .unwrap()
}

// ── Normalization through the engine ────────────────────────────────────────

#[tokio::test]
async fn test_latin1_text_is_normalized_then_converted() {
    let h = Harness::new(5);
    let input = h.write("menu.txt", LATIN1_MENU);

    let result = h.engine.convert_file(h.request(&input, "menu.html", "html")).await;

    assert!(result.success, "{}", result.message);
    assert!(result.message.starts_with("normalized:"), "{}", result.message);
    assert!(result.message.contains("->utf-8"), "{}", result.message);

    let html = std::fs::read_to_string(h.path("menu.html")).unwrap();
    assert!(html.contains("café"), "{html}");
    assert!(html.contains("crème brûlée"), "{html}");

    // Backup holds the original bytes; the live file is now UTF-8.
    assert_eq!(std::fs::read(h.path("menu.txt.bak")).unwrap(), LATIN1_MENU);
    assert!(std::fs::read_to_string(&input).unwrap().contains("café"));

    let transform = result.normalization.expect("normalization recorded");
    assert_eq!(transform.to, "utf-8");
    assert_eq!(transform.backup_path, h.path("menu.txt.bak"));

    let audit = h.engine.normalizer().audit_log().records().unwrap();
    assert_eq!(audit.len(), 1);
    assert!(audit[0].timestamp.ends_with('Z'));
}

#[tokio::test]
async fn test_four_byte_latin1_cafe_becomes_html() {
    let h = Harness::new(5);
    let input = h.write("cafe.txt", b"caf\xe9");

    let result = h.engine.convert_file(h.request(&input, "cafe.html", "html")).await;

    assert!(result.success, "{}", result.message);
    assert!(result.message.starts_with("normalized:"), "{}", result.message);
    let html = std::fs::read_to_string(h.path("cafe.html")).unwrap();
    assert!(html.contains("café"), "{html}");
    assert!(!html.contains("Ã©"), "{html}");
    assert_eq!(std::fs::read(h.path("cafe.txt.bak")).unwrap(), b"caf\xe9");
}

#[tokio::test]
async fn test_normalization_io_failure_aborts_before_converting() {
    let h = Harness::new(5);
    let input = h.write("menu.txt", LATIN1_MENU);
    // A directory where the backup should go makes the backup write fail.
    std::fs::create_dir(h.path("menu.txt.bak")).unwrap();

    let result = h.engine.convert_file(h.request(&input, "menu.html", "html")).await;

    assert!(!result.success);
    assert_eq!(result.classification, Some(FailureKind::NormalizationIo));
    assert!(result.message.contains("txt -> html"), "{}", result.message);
    assert_eq!(std::fs::read(&input).unwrap(), LATIN1_MENU);
    assert!(!h.path("menu.html").exists());
    assert_eq!(h.balance(), 5);
    assert!(h.journal_is_empty());
}

#[tokio::test]
async fn test_journal_write_failure_refunds_and_rolls_back() {
    // The journal directory path is occupied by a regular file.
    let h = Harness::with_config(ConverterRegistry::builtin().unwrap(), 5, |b, dir| {
        let blocker = dir.join("journal-blocker");
        std::fs::write(&blocker, b"not a directory").unwrap();
        b.journal_dir(blocker)
    });
    let input = h.write("menu.txt", LATIN1_MENU);

    let result = h.engine.convert_file(h.request(&input, "menu.html", "html")).await;

    assert!(!result.success);
    assert_eq!(result.classification, Some(FailureKind::Bookkeeping));
    assert!(result.message.contains("journal"), "{}", result.message);
    assert_eq!(result.credits_debited, 0);
    assert_eq!(h.balance(), 5);
    assert_eq!(std::fs::read(&input).unwrap(), LATIN1_MENU);
    assert!(!h.path("menu.txt.bak").exists());
    assert_eq!(
        std::fs::read(h.path("journal-blocker")).unwrap(),
        b"not a directory"
    );
}

#[tokio::test]
async fn test_utf16_bom_source_is_normalized() {
    let h = Harness::new(5);
    let mut bytes = vec![0xFF, 0xFE];
    for unit in "Hello, wide world".encode_utf16() {
        bytes.extend_from_slice(&unit.to_le_bytes());
    }
    let input = h.write("wide.txt", &bytes);

    let result = h.engine.convert_file(h.request(&input, "wide.md", "md")).await;

    assert!(result.success, "{}", result.message);
    assert!(
        result.message.starts_with("normalized:utf-16le->utf-8"),
        "{}",
        result.message
    );
    assert_eq!(
        std::fs::read_to_string(h.path("wide.md")).unwrap(),
        "Hello, wide world\n"
    );
}

#[tokio::test]
async fn test_binary_text_is_unsalvageable_and_converter_never_runs() {
    static CALLS: AtomicUsize = AtomicUsize::new(0);
    fn counting(_: &Path, output: &Path) -> ConverterReport {
        CALLS.fetch_add(1, Ordering::SeqCst);
        std::fs::write(output, "x").map(|_| "ok".to_string()).into()
    }

    let h = Harness::with_registry(registry_of("txt", "html", counting), 5);
    let blob: Vec<u8> = (0..64u8).flat_map(|i| [0x00, i, 0xFF, 0x01]).collect();
    let input = h.write("blob.txt", &blob);

    let result = h.engine.convert_file(h.request(&input, "blob.html", "html")).await;

    assert!(!result.success);
    assert_eq!(result.classification, Some(FailureKind::UnsalvageableInput));
    assert!(result.message.contains("txt -> html"), "{}", result.message);
    assert_eq!(CALLS.load(Ordering::SeqCst), 0);
    assert_eq!(std::fs::read(&input).unwrap(), blob);
    assert!(!h.path("blob.txt.bak").exists());
    assert_eq!(h.recorder.events(), vec![(Phase::Preprocess, 0)]);
}

// ── Dispatch ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_alias_and_canonical_tokens_resolve_identically() {
    let h = Harness::new(5);
    let input = h.path("photo.bin");
    tiny_jpg(&input);

    let via_alias = h
        .engine
        .convert_file(h.request(&input, "a.png", "PNG").with_source_format("jpeg"))
        .await;
    let via_canonical = h
        .engine
        .convert_file(h.request(&input, "b.png", "png").with_source_format("jpg"))
        .await;

    assert!(via_alias.success, "{}", via_alias.message);
    assert!(via_canonical.success, "{}", via_canonical.message);
    assert_eq!(
        std::fs::read(h.path("a.png")).unwrap(),
        std::fs::read(h.path("b.png")).unwrap()
    );
}

#[tokio::test]
async fn test_unsupported_pair_touches_nothing() {
    let h = Harness::new(5);
    let input = h.write("report.docx", b"PK\x03\x04 not really a docx");

    let result = h.engine.convert_file(h.request(&input, "report.svg", "svg")).await;

    assert!(!result.success);
    assert_eq!(result.classification, Some(FailureKind::UnsupportedPair));
    assert!(result.message.contains("Unsupported"), "{}", result.message);
    assert!(result.message.contains("docx -> svg"), "{}", result.message);
    assert!(!h.path("report.svg").exists());
    assert!(!h.path("report.docx.bak").exists());
    assert_eq!(h.balance(), 5);
    assert!(h.journal_is_empty());
}

#[tokio::test]
async fn test_unsupported_pair_is_reported_before_missing_input() {
    let h = Harness::new(5);
    let result = h
        .engine
        .convert_file(h.request(&h.path("ghost.docx"), "ghost.svg", "svg"))
        .await;
    assert_eq!(result.classification, Some(FailureKind::UnsupportedPair));
}

#[tokio::test]
async fn test_output_on_top_of_input_is_refused() {
    let h = Harness::new(5);
    let input = h.write("notes.txt", b"# Notes\n\nplain utf-8\n");

    let request = ConversionRequest::new(&input, &input, "txt")
        .with_source_format("md")
        .with_user("ana");
    let result = h.engine.convert_file(request).await;

    assert!(!result.success);
    assert_eq!(result.classification, Some(FailureKind::OutputConflict));
    assert!(result.message.contains("md -> txt"), "{}", result.message);
    assert_eq!(std::fs::read(&input).unwrap(), b"# Notes\n\nplain utf-8\n");
    assert_eq!(h.balance(), 5);
    assert!(h.journal_is_empty());
}

#[tokio::test]
async fn test_output_on_top_of_backup_is_refused() {
    let h = Harness::new(5);
    let input = h.write("menu.txt", LATIN1_MENU);

    let result = h.engine.convert_file(h.request(&input, "menu.txt.bak", "md")).await;

    assert!(!result.success);
    assert_eq!(result.classification, Some(FailureKind::OutputConflict));
    assert_eq!(std::fs::read(&input).unwrap(), LATIN1_MENU);
    assert!(!h.path("menu.txt.bak").exists());
    assert_eq!(h.balance(), 5);
}

#[tokio::test]
async fn test_missing_input_is_input_not_found() {
    let h = Harness::new(5);
    let result = h
        .engine
        .convert_file(h.request(&h.path("ghost.txt"), "ghost.html", "html"))
        .await;
    assert_eq!(result.classification, Some(FailureKind::InputNotFound));
    assert!(result.message.contains("ghost.txt"), "{}", result.message);
}

// ── Converter failures ───────────────────────────────────────────────────────

#[tokio::test]
async fn test_converter_panic_becomes_failure_and_rolls_back() {
    fn explodes(_: &Path, _: &Path) -> ConverterReport {
        panic!("renderer blew up");
    }

    let h = Harness::with_registry(registry_of("txt", "html", explodes), 5);
    let input = h.write("menu.txt", LATIN1_MENU);

    let result = h.engine.convert_file(h.request(&input, "menu.html", "html")).await;

    assert!(!result.success);
    assert_eq!(result.classification, Some(FailureKind::ConverterFailure));
    assert!(result.message.contains("renderer blew up"), "{}", result.message);
    assert_eq!(result.credits_debited, 0);
    assert_eq!(h.balance(), 5);
    assert!(h.journal_is_empty());

    // The re-encoding done for this attempt is undone.
    assert_eq!(std::fs::read(&input).unwrap(), LATIN1_MENU);
    assert!(!h.path("menu.txt.bak").exists());

    assert_eq!(
        h.recorder.events(),
        vec![(Phase::Preprocess, 0), (Phase::Preprocess, 100), (Phase::Convert, 0)]
    );
}

#[tokio::test]
async fn test_reported_failure_keeps_converter_message() {
    fn refuses(_: &Path, _: &Path) -> ConverterReport {
        ConverterReport::failed("table has ragged rows")
    }

    let h = Harness::with_registry(registry_of("csv", "html", refuses), 5);
    let input = h.write("t.csv", b"a,b\n1\n");

    let result = h.engine.convert_file(h.request(&input, "t.html", "html")).await;

    assert_eq!(result.classification, Some(FailureKind::ConverterFailure));
    assert!(result.message.contains("table has ragged rows"));
    assert!(result.message.contains("csv -> html"));
}

#[tokio::test]
async fn test_success_without_output_is_empty_output() {
    fn lies(_: &Path, _: &Path) -> ConverterReport {
        ConverterReport::ok("all good")
    }

    let h = Harness::with_registry(registry_of("txt", "html", lies), 5);
    let input = h.write("a.txt", b"plain ascii");

    let result = h.engine.convert_file(h.request(&input, "a.html", "html")).await;

    assert!(!result.success);
    assert_eq!(result.classification, Some(FailureKind::EmptyOutput));
    assert!(result.message.contains("produced no output"), "{}", result.message);
    assert_eq!(h.balance(), 5);
    assert!(h.journal_is_empty());
    assert_eq!(
        h.recorder.events(),
        vec![
            (Phase::Preprocess, 0),
            (Phase::Preprocess, 100),
            (Phase::Convert, 0),
            (Phase::Convert, 100),
            (Phase::Postprocess, 0),
        ]
    );
}

#[tokio::test]
async fn test_insufficient_credits_stops_before_normalization() {
    let h = Harness::new(0);
    let input = h.write("menu.txt", LATIN1_MENU);

    let result = h.engine.convert_file(h.request(&input, "menu.html", "html")).await;

    assert_eq!(result.classification, Some(FailureKind::InsufficientCredits));
    assert_eq!(std::fs::read(&input).unwrap(), LATIN1_MENU);
    assert!(!h.path("menu.txt.bak").exists());
    assert!(!h.path("menu.html").exists());
}

// ── Progress ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_successful_conversion_emits_six_events_in_order() {
    let h = Harness::new(5);
    let input = h.write("notes.md", b"# Notes\n\n- one\n- two\n");

    let result = h.engine.convert_file(h.request(&input, "notes.html", "html")).await;

    assert!(result.success, "{}", result.message);
    assert_eq!(
        h.recorder.events(),
        vec![
            (Phase::Preprocess, 0),
            (Phase::Preprocess, 100),
            (Phase::Convert, 0),
            (Phase::Convert, 100),
            (Phase::Postprocess, 0),
            (Phase::Postprocess, 100),
        ]
    );
}

#[tokio::test]
async fn test_hub_subscription_sees_only_its_conversion() {
    let dir = tempfile::tempdir().unwrap();
    let hub = ProgressHub::new(64);
    let config = EngineConfig::builder()
        .work_dir(dir.path().join("state"))
        .credit_cost(0)
        .progress_sink(Arc::new(hub.clone()) as Arc<dyn ProgressSink>)
        .build()
        .unwrap();
    let engine = ConversionEngine::new(
        config,
        Arc::new(ConverterRegistry::builtin().unwrap()),
        Arc::new(InMemoryLedger::new()),
    );

    let a = dir.path().join("a.txt");
    let b = dir.path().join("b.txt");
    std::fs::write(&a, "first").unwrap();
    std::fs::write(&b, "second").unwrap();
    let req_a = ConversionRequest::new(&a, dir.path().join("a.html"), "html");
    let req_b = ConversionRequest::new(&b, dir.path().join("b.html"), "html");

    let events = hub.subscribe(req_a.conversion_id.clone());
    engine.convert_file(req_b).await;
    let result = engine.convert_file(req_a.clone()).await;
    assert!(result.success, "{}", result.message);

    let seen: Vec<ProgressEvent> = events.take(6).collect().await;
    assert!(seen.iter().all(|e| e.conversion_id == req_a.conversion_id));
    assert_eq!(seen.last().map(|e| (e.phase, e.percent)), Some((Phase::Postprocess, 100)));
}

// ── Undo ─────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_undo_restores_original_bytes_and_refunds() {
    let h = Harness::new(3);
    let input = h.write("menu.txt", LATIN1_MENU);

    let result = h.engine.convert_file(h.request(&input, "menu.html", "html")).await;
    assert!(result.success, "{}", result.message);
    assert_eq!(h.balance(), 2);

    let report = h.engine.undo_manager().undo(&result.conversion_id).await.unwrap();
    assert_eq!(report.refunded, 1);
    assert_eq!(report.new_balance, 3);
    assert_eq!(report.restored_path.as_deref(), Some(input.as_path()));
    assert_eq!(std::fs::read(&input).unwrap(), LATIN1_MENU);
    // Conversion undo leaves the backup for the normalizer to clean up.
    assert!(h.path("menu.txt.bak").exists());

    let again = h.engine.undo_manager().undo(&result.conversion_id).await;
    assert!(matches!(again, Err(UndoError::AlreadyUndone { .. })));
    assert_eq!(h.balance(), 3);

    let entry = h
        .engine
        .journal()
        .load(&result.conversion_id)
        .await
        .unwrap()
        .unwrap();
    assert!(entry.is_undone());
}

#[tokio::test]
async fn test_reused_conversion_id_keeps_the_first_entry() {
    let h = Harness::new(5);
    let first_in = h.write("a.md", b"# A\n");
    let second_in = h.write("b.md", b"# B\n");

    let first = h
        .engine
        .convert_file(h.request(&first_in, "a.html", "html").with_id("fixed-id"))
        .await;
    assert!(first.success, "{}", first.message);
    assert_eq!(h.balance(), 4);

    let second = h
        .engine
        .convert_file(h.request(&second_in, "b.html", "html").with_id("fixed-id"))
        .await;
    assert!(!second.success);
    assert_eq!(second.classification, Some(FailureKind::Bookkeeping));
    assert_eq!(h.balance(), 4);

    let entry = h.engine.journal().load("fixed-id").await.unwrap().unwrap();
    assert_eq!(entry.output_path, h.path("a.html"));
}

#[tokio::test]
async fn test_undo_of_unknown_conversion_is_nothing_to_undo() {
    let h = Harness::new(3);
    let err = h.engine.undo_manager().undo("never-happened").await.unwrap_err();
    assert!(matches!(err, UndoError::NotFound { .. }));
    assert_eq!(h.balance(), 3);
}

#[tokio::test]
async fn test_failed_conversion_leaves_nothing_to_undo() {
    let h = Harness::new(3);
    let input = h.write("bad.png", b"not a png at all");

    let result = h.engine.convert_file(h.request(&input, "bad.jpg", "jpg")).await;
    assert_eq!(result.classification, Some(FailureKind::ConverterFailure));

    let err = h.engine.undo_manager().undo(&result.conversion_id).await.unwrap_err();
    assert!(matches!(err, UndoError::NotFound { .. }));
}

// ── Uploads & batches ────────────────────────────────────────────────────────

#[tokio::test]
async fn test_upload_is_staged_per_conversion() {
    let h = Harness::new(3);
    let result = h
        .engine
        .convert_upload(b"name,age\nAda,36\n", "../../people.csv", "json", "ana")
        .await;

    assert!(result.success, "{}", result.message);
    let output = result.output_path.unwrap();
    let expected_dir = h
        .dir
        .path()
        .join("state/outputs")
        .join(&result.conversion_id);
    assert_eq!(output, expected_dir.join("people.json"));

    let json: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&output).unwrap()).unwrap();
    assert_eq!(json[0]["name"], "Ada");
    assert!(h
        .dir
        .path()
        .join("state/uploads")
        .join(&result.conversion_id)
        .join("people.csv")
        .exists());
}

#[tokio::test]
async fn test_batch_runs_every_request() {
    let h = Harness::new(10);
    let png = h.path("p.png");
    tiny_png(&png);
    let txt = h.write("t.txt", b"hello");

    let requests = vec![
        h.request(&png, "p.bmp", "bmp"),
        h.request(&txt, "t.html", "html"),
        h.request(&txt, "t.svg", "svg"),
    ];
    let ids: Vec<String> = requests.iter().map(|r| r.conversion_id.clone()).collect();

    let results = h.engine.convert_batch(requests).await;
    assert_eq!(results.len(), 3);

    let by_id = |id: &str| results.iter().find(|r| r.conversion_id == id).unwrap();
    assert!(by_id(&ids[0]).success);
    assert!(by_id(&ids[1]).success);
    assert_eq!(by_id(&ids[2]).classification, Some(FailureKind::UnsupportedPair));
    assert_eq!(h.balance(), 8);
}
