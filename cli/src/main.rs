mod cli;

use anyhow::{Context, Result};
use bytes::BytesMut;
use clap::Parser;
use futures::{Future, SinkExt, StreamExt};

use isdn_hdlc::{Codec, Config, Decoder, Encoder, Status};
use isdn_tei::msg::GROUP_TEI;
use isdn_tei::{Entity, Indication, LinkConfig, Message, MessageType, Notification, Role};
use isdn_tei::{Service, ServiceHandle};

use cli::*;


/// First TEI handed out by the simulated network.
const FIRST_AUTO_TEI: u8 = 64;


#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let args = Args::parse();

    match args.command {
        Command::Encode { line, frames } => {
            cmd_encode(line_config(&line), &frames)
        },
        Command::Decode { line, chunk, max_frame, stream } => {
            cmd_decode(line_config(&line), chunk.into(), max_frame.into(), &stream.0)
        },
        Command::Tei { terminals, drop } => {
            run(cmd_tei(terminals, drop)).await
        },
    }
}

fn line_config(line: &LineArgs) -> Config {
    Config {
        adapt56: line.adapt56,
        d_channel: line.d_channel,
        bit_reversed: line.bit_reversed,
    }
}

fn print_hex(data: &[u8]) {
    let data = pretty_hex::config_hex(
        &data,
        pretty_hex::HexConfig {
            title: false,
            ..Default::default()
        },
    );

    for line in data.lines() {
        println!("  {}", line);
    }

    println!();
}

fn cmd_encode(config: Config, frames: &[Hex]) -> Result<()> {
    let mut enc = Encoder::new(config);
    let mut buf = BytesMut::new();

    for frame in frames {
        if frame.0.is_empty() {
            anyhow::bail!("cannot encode empty frame");
        }

        enc.encode_frame(&frame.0, &mut buf);
    }

    tracing::debug!(frames = frames.len(), octets = buf.len(), "encoded bitstream");

    println!("{}", hex::encode(&buf));
    Ok(())
}

fn cmd_decode(config: Config, chunk: usize, max_frame: usize, stream: &[u8]) -> Result<()> {
    let mut dec = Decoder::new(config);
    let mut buf = vec![0; max_frame + 2];

    let mut frames = 0;
    let mut errors = 0;

    for (i, fragment) in stream.chunks(chunk).enumerate() {
        let mut pos = 0;

        loop {
            let (n, status) = dec.decode(&fragment[pos..], &mut buf);
            pos += n;

            match status {
                Status::Pending => break,
                Status::Frame(len) => {
                    frames += 1;

                    println!("Frame {frames} ({len} bytes, fragment {i}):");
                    print_hex(&buf[..len]);
                },
                Status::Error(e) => {
                    errors += 1;

                    println!("Error (fragment {i}, status {}): {e}", status.code());
                    println!();
                },
            }
        }
    }

    println!("{frames} frame(s), {errors} error(s)");
    Ok(())
}

async fn cmd_tei(terminals: usize, drop: usize) -> Result<()> {
    // in-memory D-channel between terminal and network
    let (te_io, nt_io) = tokio::io::duplex(4096);
    let mut te_bus = Codec::new(Config::d_channel()).wrap(te_io);
    let mut nt_bus = Codec::new(Config::d_channel()).wrap(nt_io);

    let (te_service, te, mut te_ind) = Service::new(Entity::new(Role::User));
    let (nt_service, nt, mut nt_ind) = Service::new(Entity::new(Role::Network));

    tokio::spawn(te_service.run());
    tokio::spawn(nt_service.run());

    for _ in 0..terminals {
        let link = te.open_link(LinkConfig::dynamic(Role::User)).await?;
        te.request_assignment(link)?;

        tracing::debug!(%link, "terminal link opened");
    }

    let mut next_tei = FIRST_AUTO_TEI;
    let mut dropped = 0;
    let mut pending = terminals;

    while pending > 0 {
        tokio::select! {
            ind = te_ind.next() => match ind.context("terminal service stopped")? {
                Indication::Transmit { id, frame } => {
                    te_bus.send(frame).await?;
                    te.confirm(id)?;
                },
                Indication::Activate => {
                    te.ph_activated()?;
                },
                Indication::Notify { link, notification } => match notification {
                    Notification::AssignmentGranted(tei) => {
                        println!("link {link}: assigned TEI {tei}");
                        pending -= 1;
                    },
                    Notification::AssignmentFailed => {
                        println!("link {link}: assignment failed");
                        pending -= 1;
                    },
                    other => {
                        println!("link {link}: {other:?}");
                    },
                },
                Indication::Peer(msg) => {
                    tracing::warn!(%msg, "unexpected peer message on terminal side");
                },
            },
            ind = nt_ind.next() => match ind.context("network service stopped")? {
                Indication::Transmit { id, frame } => {
                    if dropped < drop {
                        dropped += 1;
                        tracing::info!(id, "dropping network frame");
                    } else {
                        nt_bus.send(frame).await?;
                    }

                    nt.confirm(id)?;
                },
                Indication::Activate => {
                    nt.ph_activated()?;
                },
                Indication::Notify { link, notification } => {
                    tracing::debug!(%link, ?notification, "network link notification");
                },
                Indication::Peer(msg) => {
                    network_peer(&nt, &mut next_tei, msg).await?;
                },
            },
            frame = te_bus.next() => {
                let frame = frame.context("D-channel closed")??;
                te.receive(frame)?;
            },
            frame = nt_bus.next() => {
                let frame = frame.context("D-channel closed")??;
                nt.receive(frame)?;
            },
        }
    }

    Ok(())
}

/// Answer identity requests with the next free TEI.
async fn network_peer(nt: &ServiceHandle, next_tei: &mut u8, msg: Message) -> Result<()> {
    match msg.kind {
        MessageType::Request => {
            if *next_tei >= GROUP_TEI {
                tracing::warn!(ri = msg.ri, "no TEI left to assign");
                return Ok(());
            }

            let tei = *next_tei;
            *next_tei += 1;

            let link = nt.open_link(LinkConfig::new(tei, Role::Network)).await?;
            nt.assignment_requested(link, msg.ri)?;

            tracing::debug!(%link, ri = msg.ri, tei, "assigning TEI");
        },
        _ => {
            tracing::info!(%msg, "peer message");
        },
    }

    Ok(())
}

pub async fn run<F>(task: F) -> Result<()>
where
    F: Future<Output=Result<(), anyhow::Error>>,
{
    tokio::select! {
        res = task => {
            res?;
            tracing::trace!("task terminated successfully");
        },
        sig = tokio::signal::ctrl_c() => {
            sig?;
            tracing::trace!("termination requested");
        },
    }

    Ok(())
}
