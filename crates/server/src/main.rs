use std::thread;
use std::time::{Duration, Instant};

use anyhow::Result;
use clap::Parser;
use glam::Vec3;
use log::info;

use arena::{Buttons, MAX_CLIENTS, RoundPhase, ServerSession, SessionEvent, UdpTransport};

#[derive(Parser)]
#[command(name = "arena-server")]
#[command(about = "Arena game server")]
struct Args {
    #[arg(short, long, default_value = "0.0.0.0")]
    bind: String,

    #[arg(short, long, default_value_t = arena::DEFAULT_PORT)]
    port: u16,

    #[arg(short, long, default_value_t = arena::DEFAULT_TICK_RATE)]
    tick_rate: u32,

    #[arg(long, default_value_t = 5.0, help = "Lobby seconds before a round (re)starts")]
    lobby_secs: f32,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let bind_addr = format!("{}:{}", args.bind, args.port);
    let transport = UdpTransport::host(&bind_addr, MAX_CLIENTS)?;
    info!("server listening on {}", transport.local_addr());

    let mut session = ServerSession::new(transport);
    let tick = Duration::from_secs_f32(1.0 / args.tick_rate as f32);
    let dt = tick.as_secs_f32();
    let mut lobby_timer = args.lobby_secs;

    loop {
        let frame_start = Instant::now();

        if session.round().is_active() {
            // The hosting player idles in place, facing the arena center.
            session.set_local_input(Vec3::ZERO, Buttons::empty())?;
        }
        session.update(dt)?;

        for event in session.drain_events() {
            match event {
                SessionEvent::PlayerJoined { peer, slot } => {
                    info!("peer {peer} joined as player {slot}");
                }
                SessionEvent::PlayerLeft { peer, slot } => {
                    info!("peer {peer} left player slot {slot}");
                }
                SessionEvent::RoundStarted => info!("round started"),
                SessionEvent::RoundEnded => {
                    info!("round over, scores {:?}", session.round().scores);
                }
            }
        }

        // Rounds start and restart automatically once anyone has joined.
        if session.round().phase() != RoundPhase::Active {
            if session.slots().occupied().count() > 1 {
                lobby_timer -= dt;
                if lobby_timer <= 0.0 {
                    session.start_round()?;
                    lobby_timer = args.lobby_secs;
                }
            } else {
                lobby_timer = args.lobby_secs;
            }
        }

        if let Some(remaining) = tick.checked_sub(frame_start.elapsed()) {
            thread::sleep(remaining);
        }
    }
}
