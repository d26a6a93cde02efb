//! Runs de bout en bout sur localhost : un coordinateur en thread,
//! des workers en threads, et les frames vérifiées sur disque.

use std::net::{TcpListener, TcpStream};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use ms_worker::WorkerSettings;

// ─── Harness ───────────────────────────────────────────────────────

/// Un port libre à l'instant du bind. Petite fenêtre de réutilisation
/// entre le drop et le run — négligeable en test local.
fn free_address() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind :0");
    listener.local_addr().expect("local addr").to_string()
}

/// Attend que le serveur du coordinateur accepte des connexions.
fn wait_for_server(address: &str) {
    let deadline = Instant::now() + Duration::from_secs(10);
    loop {
        if TcpStream::connect(address).is_ok() {
            return;
        }
        assert!(
            Instant::now() < deadline,
            "coordinator never came up at {address}"
        );
        thread::sleep(Duration::from_millis(20));
    }
}

/// Écrit un plan 4×4 lisible par le coordinateur.
fn write_plan(
    dir: &Path,
    run_name: &str,
    address: &str,
    granularity: u8,
    transitions_json: &str,
) -> PathBuf {
    let body = format!(
        r#"{{
  "GenerateMovie": false,
  "RunName": "{run_name}",
  "SavePath": "{save}",
  "ServerAddress": "{address}",
  "TaskGeneration": {granularity},
  "TransitionSettings": {transitions_json},
  "MandelbrotSettings": {{
    "Boundary": 4.0,
    "Width": 4,
    "Height": 4,
    "MaxIterations": 50,
    "SuperSampling": 1,
    "SmoothColoring": false,
    "EscapeColor": {{"R": 0, "G": 0, "B": 0, "A": 255}},
    "Palette": [{{"R": 255, "G": 255, "B": 255, "A": 255}}]
  }}
}}"#,
        save = dir.display()
    );
    let path = dir.join(format!("{run_name}.json"));
    std::fs::write(&path, body).expect("write plan");
    path
}

/// Lance un run complet : coordinateur + `workers` moteurs, et rend
/// le résumé du coordinateur.
fn run_distributed(plan_path: PathBuf, address: &str, workers: usize) -> ms_coordinator::RunSummary {
    let coordinator = thread::Builder::new()
        .name("test-coordinator".to_string())
        .spawn(move || ms_coordinator::run(&plan_path))
        .expect("spawn coordinator");

    wait_for_server(address);

    let mut handles = Vec::new();
    for index in 0..workers {
        let settings = WorkerSettings {
            coordinator_address: address.to_string(),
            bind_host: "127.0.0.1".to_string(),
        };
        handles.push(
            thread::Builder::new()
                .name(format!("test-worker-{index}"))
                .spawn(move || ms_worker::run(&settings))
                .expect("spawn worker"),
        );
    }
    let mut completed_total = 0u64;
    for handle in handles {
        completed_total += handle.join().expect("worker thread").expect("worker run");
    }
    // La répartition entre workers est quelconque, le total non.
    assert!(completed_total > 0, "the pool completed no task");

    coordinator
        .join()
        .expect("coordinator thread")
        .expect("coordinator run")
}

// ─── Scénarios ─────────────────────────────────────────────────────

const IDENTITY_TRANSITION: &str = r#"[{
  "StartX": 0.0, "StartY": 0.0, "EndX": 0.0, "EndY": 0.0,
  "MagnificationStart": 0.5, "MagnificationEnd": 0.5,
  "MagnificationStep": 1.1
}]"#;

const IN_THEN_OUT_TRANSITIONS: &str = r#"[
  {"StartX": 0.0, "StartY": 0.0, "EndX": 0.0, "EndY": 0.0,
   "MagnificationStart": 1.0, "MagnificationEnd": 8.0, "MagnificationStep": 2.0},
  {"StartX": 0.0, "StartY": 0.0, "EndX": 0.0, "EndY": 0.0,
   "MagnificationStart": 8.0, "MagnificationEnd": 1.0, "MagnificationStep": 2.0}
]"#;

#[test]
fn smoke_render_writes_one_frame() {
    let dir = tempfile::tempdir().expect("tempdir");
    let address = free_address();
    let plan = write_plan(dir.path(), "smoke", &address, 0, IDENTITY_TRANSITION);

    let summary = run_distributed(plan, &address, 1);
    assert_eq!(summary.image_count, 1);
    assert_eq!(summary.frames_written, 1);

    // La copie de reproductibilité est dans le dossier du run.
    assert!(summary.run_dir.join("smoke.json").is_file());

    let frame = summary.run_dir.join("0.jpg");
    let decoded = image::open(&frame).expect("decodable frame").to_rgb8();
    assert_eq!(decoded.dimensions(), (4, 4));

    // L'origine du plan n'échappe jamais, le coin échappe vite. Le
    // JPEG lisse un 4×4, on vérifie donc le contraste, pas l'exact.
    let center = decoded.get_pixel(2, 2)[0];
    let corner = decoded.get_pixel(0, 0)[0];
    assert!(
        u16::from(corner) > u16::from(center) + 50,
        "corner {corner} should be much brighter than center {center}"
    );
}

#[test]
fn multi_transition_plan_renders_every_frame() {
    let dir = tempfile::tempdir().expect("tempdir");
    let address = free_address();
    let plan = write_plan(dir.path(), "inout", &address, 0, IN_THEN_OUT_TRANSITIONS);

    let summary = run_distributed(plan, &address, 2);
    // 3 frames de zoom avant, 3 de zoom arrière : la génération ne
    // s'arrête pas après la première transition.
    assert_eq!(summary.image_count, 6);
    assert_eq!(summary.frames_written, 6);

    for number in 0..6 {
        let frame = summary.run_dir.join(format!("{number}.jpg"));
        let decoded = image::open(&frame)
            .unwrap_or_else(|e| panic!("frame {number} undecodable: {e}"));
        assert_eq!((decoded.width(), decoded.height()), (4, 4));
    }
    assert!(!summary.run_dir.join("6.jpg").exists());
}

#[test]
fn worker_count_does_not_change_the_frames() {
    let dir = tempfile::tempdir().expect("tempdir");

    let address_one = free_address();
    let plan_one = write_plan(dir.path(), "baseline", &address_one, 2, IN_THEN_OUT_TRANSITIONS);
    let baseline = run_distributed(plan_one, &address_one, 1);

    let address_two = free_address();
    let plan_two = write_plan(dir.path(), "pair", &address_two, 2, IN_THEN_OUT_TRANSITIONS);
    let pair = run_distributed(plan_two, &address_two, 2);

    assert_eq!(baseline.frames_written, pair.frames_written);
    for number in 0..baseline.image_count {
        let a = std::fs::read(baseline.run_dir.join(format!("{number}.jpg"))).expect("baseline");
        let b = std::fs::read(pair.run_dir.join(format!("{number}.jpg"))).expect("pair");
        assert_eq!(a, b, "frame {number} must not depend on the worker pool");
    }
}
