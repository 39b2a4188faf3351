use std::net::SocketAddr;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::Result;
use clap::Parser;
use glam::Vec3;
use log::info;

use arena::{Buttons, ClientSession, SessionEvent, UdpTransport};

#[derive(Parser)]
#[command(name = "arena-client")]
#[command(about = "Headless arena client bot")]
struct Args {
    #[arg(
        short,
        long,
        default_value = "127.0.0.1:27016",
        help = "Server address to connect to"
    )]
    server: String,

    #[arg(short, long, default_value_t = arena::DEFAULT_TICK_RATE)]
    tick_rate: u32,

    #[arg(long, help = "Stand still instead of wandering")]
    idle: bool,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let server_addr: SocketAddr = args.server.parse()?;
    let transport = UdpTransport::connect(server_addr)?;
    info!("connecting to {server_addr}");

    let mut session = ClientSession::new(transport);
    let tick = Duration::from_secs_f32(1.0 / args.tick_rate as f32);
    let dt = tick.as_secs_f32();
    let mut elapsed = 0.0f32;

    loop {
        let frame_start = Instant::now();

        session.update()?;

        // Input goes out every tick even in the lobby: the first datagram
        // is what registers this client with the server, and steady traffic
        // keeps the server's idle timeout fed between rounds.
        let (pointer, buttons) = if session.round().is_active() && !args.idle {
            bot_input(elapsed)
        } else {
            (Vec3::ZERO, Buttons::empty())
        };
        session.send_input(pointer, buttons)?;

        for event in session.drain_events() {
            match event {
                SessionEvent::RoundStarted => info!("round started"),
                SessionEvent::RoundEnded => {
                    info!("round over, scores {:?}", session.round().scores);
                }
                _ => {}
            }
        }

        elapsed += dt;
        if let Some(remaining) = tick.checked_sub(frame_start.elapsed()) {
            thread::sleep(remaining);
        }
    }
}

/// Slow clockwise wander with a fire attempt every few seconds. The server
/// ignores fire edges that land inside the cooldown, so spamming is safe.
fn bot_input(elapsed: f32) -> (Vec3, Buttons) {
    let angle = elapsed * 0.4;
    let pointer = Vec3::new(angle.cos() * 20.0, 1.0, angle.sin() * 20.0);

    let mut buttons = match (elapsed as u32 / 3) % 4 {
        0 => Buttons::UP,
        1 => Buttons::RIGHT,
        2 => Buttons::DOWN,
        _ => Buttons::LEFT,
    };
    if elapsed % 4.0 < dt_window() {
        buttons |= Buttons::FIRE;
    }
    (pointer, buttons)
}

fn dt_window() -> f32 {
    1.0 / arena::DEFAULT_TICK_RATE as f32
}
