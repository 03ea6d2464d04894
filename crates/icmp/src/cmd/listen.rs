use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc, Weak};
use std::time::{Duration, Instant};

use icmp_engine::{spawn_receiver, EngineConfig, IcmpEngine, TARGET_ID_SPACE};
use icmp_frame::{Frame, FrameType};
use icmp_link::UnixLinkListener;
use tracing::{info, warn};

use crate::cmd::ListenArgs;
use crate::exit::{engine_error, link_error, CliError, CliResult, INTERNAL, SUCCESS};
use crate::output::{print_frame, OutputFormat};

const TICK: Duration = Duration::from_millis(50);
const SETTLE: Duration = Duration::from_secs(1);

pub fn run(args: ListenArgs, format: OutputFormat) -> CliResult<i32> {
    let listener =
        UnixLinkListener::bind(&args.path).map_err(|err| link_error("bind failed", err))?;

    let running = Arc::new(AtomicBool::new(true));
    install_ctrlc_handler(running.clone())?;

    info!(path = ?listener.path(), "waiting for peer board");
    let (link, reader) = listener
        .accept()
        .map_err(|err| link_error("accept failed", err))?;

    let config = EngineConfig {
        max_targets: TARGET_ID_SPACE,
        ..EngineConfig::default()
    };
    let engine =
        Arc::new(IcmpEngine::with_config(config).map_err(|err| engine_error("invalid config", err))?);

    let (tx, frames) = mpsc::channel::<Frame>();
    let targets: Vec<u8> = match &args.targets {
        Some(targets) => targets.clone(),
        None => (0..=u8::MAX).collect(),
    };
    for target in targets {
        let tx = tx.clone();
        let weak = Arc::downgrade(&engine);
        let ack = args.ack;
        engine
            .register_target(target, move |frame: &Frame| {
                if ack && frame.frame_type == FrameType::Command {
                    acknowledge(&weak, frame);
                }
                let _ = tx.send(frame.clone());
            })
            .map_err(|err| engine_error("register failed", err))?;
    }
    drop(tx);

    let dispatcher = engine
        .start(link)
        .map_err(|err| engine_error("engine start failed", err))?;
    let receiver = spawn_receiver(Arc::clone(&engine), reader)
        .map_err(|err| engine_error("receiver start failed", err))?;

    let mut printed = 0usize;
    let mut print = |frame: &Frame| -> bool {
        print_frame(frame, format);
        printed = printed.saturating_add(1);
        args.count.is_some_and(|count| printed >= count)
    };

    let mut done = false;
    while running.load(Ordering::SeqCst) {
        match frames.recv_timeout(TICK) {
            Ok(frame) => {
                if print(&frame) {
                    done = true;
                    break;
                }
            }
            Err(mpsc::RecvTimeoutError::Timeout) => {
                if receiver.is_finished() && engine.rx_pending() == 0 {
                    break;
                }
            }
            Err(mpsc::RecvTimeoutError::Disconnected) => break,
        }
    }

    // Let queued acknowledgements reach the link before stopping.
    let deadline = Instant::now() + SETTLE;
    while engine.tx_pending() > 0 && Instant::now() < deadline {
        std::thread::sleep(TICK / 10);
    }
    if let Err(err) = dispatcher.shutdown() {
        warn!(error = %err, "dispatch thread ended abnormally");
    }
    if done {
        return Ok(SUCCESS);
    }
    while let Ok(frame) = frames.try_recv() {
        if print(&frame) {
            return Ok(SUCCESS);
        }
    }

    if !receiver.is_finished() {
        return Ok(SUCCESS);
    }
    match receiver.join() {
        Ok(summary) => info!(
            frames = summary.frames,
            dropped = summary.dropped,
            discarded_bytes = summary.discarded_bytes,
            "peer disconnected"
        ),
        Err(err) => warn!(error = %err, "receive thread ended abnormally"),
    }
    Ok(SUCCESS)
}

fn acknowledge(engine: &Weak<IcmpEngine>, frame: &Frame) {
    let Some(engine) = engine.upgrade() else {
        return;
    };
    if let Err(err) = engine.respond(frame.target, frame.msg_id, &[]) {
        warn!(
            target_id = frame.target,
            msg_id = frame.msg_id,
            error = %err,
            "failed to queue acknowledgement"
        );
    }
}

fn install_ctrlc_handler(running: Arc<AtomicBool>) -> CliResult<()> {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))
}
