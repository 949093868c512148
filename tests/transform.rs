//! Transform lifecycle tests against scripted stand-in engines.
//!
//! Each stand-in is a small `/bin/sh` script that ignores the Ghostscript
//! arguments (or echoes them) and behaves in one specific way: echo stdin,
//! answer late, die mid-stream, exit non-zero after output, hang.
//!
//! The scripts are written once per test binary, before any test spawns a
//! process, so no fork can inherit a still-open write handle (ETXTBSY).

#![cfg(unix)]

use futures::stream::{self, StreamExt};
use pdf2bmp::{
    collect_bitmap, convert_bytes, convert_stream, ErrorKind, RasterEngine, RasterError,
    RasterTransform, ResolutionSpec, SessionState, TransformConfig,
};
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

// ── Stand-in engines ─────────────────────────────────────────────────────────

struct Engines {
    /// Copies stdin to stdout.
    echo: PathBuf,
    /// Prints its arguments, one per line, after draining stdin.
    args: PathBuf,
    /// Drains stdin, waits, then writes "late".
    late: PathBuf,
    /// Exits 3 without reading anything.
    dies: PathBuf,
    /// Drains stdin, writes "partial", exits 2.
    fails_after_output: PathBuf,
    /// Never exits on its own.
    hangs: PathBuf,
    /// Reads and discards stdin forever.
    swallows: PathBuf,
    /// Drains stdin, then dies from SIGKILL.
    killed_while_draining: PathBuf,
}

fn engines() -> &'static Engines {
    static ENGINES: OnceLock<Engines> = OnceLock::new();
    ENGINES.get_or_init(|| {
        let dir = PathBuf::from(env!("CARGO_TARGET_TMPDIR")).join("pdf2bmp-engines");
        std::fs::create_dir_all(&dir).unwrap();
        Engines {
            echo: script(&dir, "echo.sh", "exec cat"),
            args: script(
                &dir,
                "args.sh",
                "cat > /dev/null\nfor a in \"$@\"; do printf '%s\\n' \"$a\"; done",
            ),
            late: script(&dir, "late.sh", "cat > /dev/null\nsleep 1\nprintf late"),
            dies: script(&dir, "dies.sh", "exit 3"),
            fails_after_output: script(
                &dir,
                "fails_after_output.sh",
                "cat > /dev/null\nprintf partial\nexit 2",
            ),
            hangs: script(&dir, "hangs.sh", "exec sleep 30"),
            swallows: script(&dir, "swallows.sh", "exec cat > /dev/null"),
            killed_while_draining: script(
                &dir,
                "killed_while_draining.sh",
                "cat > /dev/null\nkill -9 $$",
            ),
        }
    })
}

fn script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("pdf2bmp=debug")),
        )
        .with_test_writer()
        .try_init();
}

fn transform(engine: &Path) -> RasterTransform {
    init_logging();
    RasterTransform::new(Some(engine), ResolutionSpec::default()).unwrap()
}

fn sample_document(len: usize) -> Vec<u8> {
    let mut doc = b"%PDF-1.4\n".to_vec();
    doc.extend((0..len).map(|i| (i % 251) as u8));
    doc
}

async fn wait_for_state(t: &RasterTransform, state: SessionState) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while t.state() != state {
        assert!(Instant::now() < deadline, "still {} after 5s", t.state());
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

async fn run_chunked(engine: &Path, doc: &[u8], chunk: usize) -> Vec<u8> {
    let mut t = transform(engine);
    let output = t.output().unwrap();
    for piece in doc.chunks(chunk) {
        t.write(piece.to_vec()).await.unwrap();
    }
    t.finish().await.unwrap();
    output.collect::<Vec<_>>().await.concat()
}

// ── Happy path ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn engine_receives_ghostscript_arguments() {
    let mut t = transform(&engines().args);
    let output = t.output().unwrap();
    t.finish().await.unwrap();

    let printed = String::from_utf8(output.collect::<Vec<_>>().await.concat()).unwrap();
    let args: Vec<&str> = printed.lines().collect();
    assert_eq!(
        args,
        [
            "-sDEVICE=bmpmono",
            "-sOutputFile=%stdout",
            "-q",
            "-r300",
            "-g1211x1771",
            "-dPDFFitPage",
            "-",
        ]
    );
    assert_eq!(t.state(), SessionState::Completed);
}

#[tokio::test]
async fn chunking_is_transparent() {
    let doc = sample_document(10_000);
    let whole = run_chunked(&engines().echo, &doc, doc.len()).await;
    let small = run_chunked(&engines().echo, &doc, 7).await;
    let medium = run_chunked(&engines().echo, &doc, 4096).await;

    assert_eq!(whole, doc);
    assert_eq!(small, whole);
    assert_eq!(medium, whole);
}

#[tokio::test]
async fn large_input_does_not_deadlock_on_full_pipes() {
    // Several times any pipe buffer; the echo engine writes while we write.
    let doc = sample_document(4 * 1024 * 1024);
    let out = tokio::time::timeout(
        Duration::from_secs(30),
        run_chunked(&engines().echo, &doc, 64 * 1024),
    )
    .await
    .expect("conversion stalled");
    assert_eq!(out.len(), doc.len());
    assert!(out == doc);
}

#[tokio::test]
async fn finish_waits_for_output_produced_after_input_ends() {
    let mut t = transform(&engines().late);
    let mut output = t.output().unwrap();
    t.write(sample_document(100)).await.unwrap();

    let started = Instant::now();
    t.finish().await.unwrap();
    assert!(
        started.elapsed() >= Duration::from_millis(900),
        "finish returned before the engine produced its output"
    );
    assert_eq!(t.state(), SessionState::Completed);

    // Everything is already buffered once finish has returned.
    let mut collected = Vec::new();
    while let Some(chunk) = output.next().await {
        collected.extend_from_slice(&chunk);
    }
    assert_eq!(collected, b"late");
}

#[tokio::test]
async fn empty_chunks_are_accepted() {
    let mut t = transform(&engines().echo);
    let output = t.output().unwrap();
    t.write(Vec::new()).await.unwrap();
    t.write(b"abc".to_vec()).await.unwrap();
    t.write(Vec::new()).await.unwrap();
    t.finish().await.unwrap();
    assert_eq!(output.collect::<Vec<_>>().await.concat(), b"abc");
}

#[tokio::test]
async fn engine_factory_mints_independent_sessions() {
    let engine = RasterEngine::new(Some(engines().echo.as_path())).unwrap();
    let mut a = engine.transform(ResolutionSpec::default()).unwrap();
    let mut b = engine.transform(ResolutionSpec::new(72, 100.0, 100.0).unwrap()).unwrap();
    assert_ne!(a.id(), b.id());
    assert_eq!(a.invocation().args()[3], "-r300");
    assert_eq!(b.invocation().args()[3], "-r72");

    let (oa, ob) = (a.output().unwrap(), b.output().unwrap());
    a.write(b"first".to_vec()).await.unwrap();
    b.write(b"second".to_vec()).await.unwrap();
    a.finish().await.unwrap();
    b.finish().await.unwrap();
    assert_eq!(oa.collect::<Vec<_>>().await.concat(), b"first");
    assert_eq!(ob.collect::<Vec<_>>().await.concat(), b"second");
}

// ── Failure latching ─────────────────────────────────────────────────────────

#[tokio::test]
async fn abnormal_exit_is_latched_and_repeated() {
    let mut t = transform(&engines().dies);
    wait_for_state(&t, SessionState::Failed).await;

    let first = t.write(sample_document(16)).await.unwrap_err();
    assert!(
        matches!(first, RasterError::EngineExited { code: Some(3) }),
        "got: {first}"
    );
    assert_eq!(first.kind(), ErrorKind::Runtime);

    let second = t.write(sample_document(16)).await.unwrap_err();
    let third = t.finish().await.unwrap_err();
    assert_eq!(second.to_string(), first.to_string());
    assert_eq!(third.to_string(), first.to_string());
    assert_eq!(t.state(), SessionState::Failed);
    assert!(t.error().is_some());
}

#[tokio::test]
async fn write_into_dead_engine_fails_with_runtime_error() {
    let mut t = transform(&engines().dies);
    // Keep writing until the dead pipe is noticed.
    let doc = sample_document(1024 * 1024);
    let mut failure = None;
    for _ in 0..64 {
        if let Err(e) = t.write(doc.clone()).await {
            failure = Some(e);
            break;
        }
    }
    let err = failure.expect("writes into an exited engine must fail");
    assert_eq!(err.kind(), ErrorKind::Runtime);

    let again = t.write(b"more".to_vec()).await.unwrap_err();
    assert_eq!(again.to_string(), err.to_string());
}

#[tokio::test]
async fn non_zero_exit_after_output_fails_finish_without_retracting_output() {
    let mut t = transform(&engines().fails_after_output);
    let output = t.output().unwrap();
    t.write(sample_document(32)).await.unwrap();

    let err = t.finish().await.unwrap_err();
    assert!(
        matches!(err, RasterError::EngineExited { code: Some(2) }),
        "got: {err}"
    );
    assert_eq!(t.state(), SessionState::Failed);
    assert_eq!(output.collect::<Vec<_>>().await.concat(), b"partial");
}

#[tokio::test]
async fn signal_during_drain_fails_finish() {
    let mut t = transform(&engines().killed_while_draining);
    t.write(sample_document(64)).await.unwrap();

    let err = t.finish().await.unwrap_err();
    assert!(
        matches!(err, RasterError::EngineExited { code: None }),
        "got: {err}"
    );
    assert_eq!(err.kind(), ErrorKind::Runtime);
    assert_eq!(t.state(), SessionState::Failed);
    assert_eq!(t.finish().await.unwrap_err().to_string(), err.to_string());
}

#[tokio::test]
async fn session_passes_through_draining() {
    let mut t = transform(&engines().late);
    let mut states = t.subscribe_state();
    t.write(sample_document(16)).await.unwrap();

    let (finished, seen) = tokio::join!(t.finish(), async {
        states
            .wait_for(|s| *s == SessionState::Draining)
            .await
            .map(|s| *s)
    });
    finished.unwrap();
    assert_eq!(seen.unwrap(), SessionState::Draining);
    assert_eq!(t.state(), SessionState::Completed);
}

#[tokio::test]
async fn input_after_finish_is_rejected() {
    let mut t = transform(&engines().echo);
    t.finish().await.unwrap();
    assert!(matches!(
        t.write(b"late".to_vec()).await,
        Err(RasterError::InputClosed)
    ));
    assert!(matches!(t.finish().await, Err(RasterError::InputClosed)));
    assert_eq!(t.state(), SessionState::Completed);
}

// ── Stream helpers ───────────────────────────────────────────────────────────

#[tokio::test]
async fn pipe_reports_failure_exactly_once_as_last_item() {
    let t = transform(&engines().fails_after_output);
    let input = stream::iter(vec![Ok(sample_document(8)), Ok(sample_document(8))]);
    let items: Vec<_> = t.pipe(input).collect().await;

    let errors = items.iter().filter(|i| i.is_err()).count();
    assert_eq!(errors, 1);
    assert!(items.last().unwrap().is_err());
    let data: Vec<u8> = items
        .into_iter()
        .filter_map(Result::ok)
        .flatten()
        .collect();
    assert_eq!(data, b"partial");
}

#[tokio::test]
async fn pipe_surfaces_input_errors() {
    let t = transform(&engines().echo);
    let input = stream::iter(vec![
        Ok(b"ok".to_vec()),
        Err(std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "truncated upload")),
    ]);
    let items: Vec<_> = t.pipe(input).collect().await;
    let last = items.last().unwrap().as_ref().unwrap_err();
    assert!(matches!(last, RasterError::InputRead { .. }), "got: {last}");
    assert_eq!(items.iter().filter(|i| i.is_err()).count(), 1);
}

#[tokio::test]
async fn convert_bytes_collects_bitmap_and_stats() {
    let config = TransformConfig::builder()
        .engine_path(&engines().echo)
        .chunk_size(1000)
        .build()
        .unwrap();
    let doc = sample_document(4500);
    let out = convert_bytes(&doc, &config).await.unwrap();

    assert_eq!(out.bitmap, doc);
    assert_eq!(out.stats.input_bytes, doc.len() as u64);
    assert_eq!(out.stats.input_chunks, 5);
    assert_eq!(out.stats.output_bytes, doc.len() as u64);
}

#[tokio::test]
async fn convert_stream_matches_direct_transform() {
    let config = TransformConfig::builder()
        .engine_path(&engines().echo)
        .build()
        .unwrap();
    let doc = sample_document(2048);
    let chunks: Vec<std::io::Result<Vec<u8>>> =
        doc.chunks(100).map(|c| Ok(c.to_vec())).collect();
    let out = collect_bitmap(convert_stream(stream::iter(chunks), &config).unwrap())
        .await
        .unwrap();
    assert_eq!(out.bitmap, run_chunked(&engines().echo, &doc, doc.len()).await);
}

// ── Teardown ─────────────────────────────────────────────────────────────────

#[cfg(target_os = "linux")]
async fn assert_engine_gone(pid: u32) {
    let status = PathBuf::from(format!("/proc/{pid}/status"));
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        let alive = std::fs::read_to_string(&status)
            .map(|s| !s.lines().any(|l| l.starts_with("State:") && l.contains('Z')))
            .unwrap_or(false);
        if !alive {
            return;
        }
        assert!(Instant::now() < deadline, "engine {pid} survived teardown");
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

#[cfg(target_os = "linux")]
#[tokio::test]
async fn dropping_the_transform_kills_the_engine() {
    let mut t = transform(&engines().hangs);
    let pid = t.id().expect("engine started");
    t.write(b"%PDF".to_vec()).await.unwrap();
    drop(t);
    assert_engine_gone(pid).await;
}

#[cfg(target_os = "linux")]
#[tokio::test]
async fn dropping_the_piped_stream_kills_the_engine() {
    let t = transform(&engines().swallows);
    let pid = t.id().expect("engine started");
    let mut piped = t.pipe(stream::repeat_with(|| Ok(vec![0u8; 4096])));

    // The engine never answers; give the feeder time to get going.
    let polled = tokio::time::timeout(Duration::from_millis(200), piped.next()).await;
    assert!(polled.is_err(), "engine produced output unexpectedly");
    drop(piped);
    assert_engine_gone(pid).await;
}

#[cfg(target_os = "linux")]
#[tokio::test]
async fn dropping_a_stream_blocked_on_a_full_pipe_kills_the_engine() {
    // `sleep` never reads stdin, so the feeder ends up stuck in a write.
    let t = transform(&engines().hangs);
    let pid = t.id().expect("engine started");
    let mut piped = t.pipe(stream::repeat_with(|| Ok(vec![0u8; 64 * 1024])));

    let polled = tokio::time::timeout(Duration::from_millis(200), piped.next()).await;
    assert!(polled.is_err(), "engine produced output unexpectedly");
    drop(piped);
    assert_engine_gone(pid).await;
}
