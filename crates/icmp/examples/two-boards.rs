//! Two engines joined by a socket pair, standing in for two boards on a
//! UART. Board B answers COMMANDs on target 1 and prints NOTIFYs on
//! target 2.
//!
//! Run with:
//!   cargo run --example two-boards

use std::os::unix::net::UnixStream;
use std::sync::{mpsc, Arc};
use std::time::Duration;

use icmp::engine::spawn_receiver;
use icmp::link::uds;
use icmp::{Frame, FrameType, IcmpEngine};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let (a, b) = UnixStream::pair()?;
    let (link_a, reader_a) = uds::split(a)?;
    let (link_b, reader_b) = uds::split(b)?;

    let board_a = Arc::new(IcmpEngine::new());
    let board_b = Arc::new(IcmpEngine::new());

    let responder = Arc::downgrade(&board_b);
    board_b.register_target(1, move |frame: &Frame| {
        if frame.frame_type != FrameType::Command {
            return;
        }
        if let Some(board) = responder.upgrade() {
            let mut reply = frame.payload().to_vec();
            reply.reverse();
            let _ = board.respond(frame.target, frame.msg_id, &reply);
        }
    })?;
    board_b.register_target(2, |frame: &Frame| {
        eprintln!(
            "board B: notify on target {}: {}",
            frame.target,
            String::from_utf8_lossy(frame.payload())
        );
    })?;

    let dispatch_a = board_a.start(link_a)?;
    let dispatch_b = board_b.start(link_b)?;
    let _rx_a = spawn_receiver(Arc::clone(&board_a), reader_a)?;
    let _rx_b = spawn_receiver(Arc::clone(&board_b), reader_b)?;

    board_a.notify(2, b"hello from A")?;

    let (tx, rx) = mpsc::channel();
    let msg_id = board_a.command(1, b"stressed", move |payload| {
        let _ = tx.send(payload.to_vec());
    })?;
    let reply = rx.recv_timeout(Duration::from_secs(1))?;
    eprintln!(
        "board A: response to msg_id {msg_id}: {}",
        String::from_utf8_lossy(&reply)
    );

    std::thread::sleep(Duration::from_millis(50));
    eprintln!("board A stats: {:?}", board_a.stats());
    eprintln!("board B stats: {:?}", board_b.stats());

    dispatch_a.shutdown()?;
    dispatch_b.shutdown()?;
    Ok(())
}
