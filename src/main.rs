//! Command-line consumer: connect one transport and print frames as they arrive.

use std::{sync::Arc, time::Duration};

use anyhow::{bail, Context, Result};
use clap::Parser;
use tokio::signal::unix::{self, SignalKind};
use uuid::Uuid;

use skinsense::{
    tracing::{init_journald_or_stdout, prelude::*},
    Config, Connections, Frame, Mailbox, MailboxError, TransportKind,
};

/// Stream readings from a wearable skin sensor
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Transport to connect
    #[arg(value_enum)]
    transport: TransportKind,

    /// Serial port (bt, usb)
    #[arg(short, long)]
    port: Option<String>,

    /// Serial baud rate (bt, usb)
    #[arg(short, long)]
    baud: Option<u32>,

    /// Device address (ble)
    #[arg(short, long)]
    address: Option<String>,

    /// Notification characteristic UUID (ble)
    #[arg(short, long)]
    characteristic: Option<Uuid>,

    /// Print each frame as a JSON line on stdout
    #[arg(long)]
    json: bool,

    /// Mailbox polling interval in milliseconds
    #[arg(long, default_value_t = 50)]
    poll_ms: u64,
}

impl Args {
    fn apply(&self, config: &mut Config) {
        let serial = match self.transport {
            TransportKind::Bt => Some(&mut config.bt),
            TransportKind::Usb => Some(&mut config.usb),
            _ => None,
        };
        if let Some(serial) = serial {
            if let Some(port) = &self.port {
                serial.port = port.clone();
            }
            if let Some(baud) = self.baud {
                serial.baud_rate = baud;
            }
        }
        if let Some(address) = &self.address {
            config.ble.address = address.clone();
        }
        if let Some(characteristic) = self.characteristic {
            config.ble.characteristic = characteristic;
        }
    }
}

fn print_frame(frame: &Frame, json: bool) -> Result<()> {
    trace!(kind = frame.kind(), "Frame taken");
    if json {
        println!("{}", serde_json::to_string(frame)?);
        return Ok(());
    }
    match frame {
        Frame::Temperature(t) => info!(
            object_ir = t.object_ir(),
            ambient_ir = t.ambient_ir(),
            contact = t.contact(),
            "Temperature"
        ),
        Frame::Pressure(m) => {
            let peak = m.iter().fold(0.0f32, f32::max);
            info!(peak, rows = ?m.rows(), "Pressure");
        }
        Frame::Raw(bytes) => info!(len = bytes.len(), data = ?bytes, "Raw"),
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_journald_or_stdout();

    let mut config = Config::from_env();
    args.apply(&mut config);

    let kind = args.transport;
    let mailbox = Arc::new(Mailbox::new());
    let mut connections = Connections::from_config(&config);

    // Connecting blocks for the probe window
    let (mut connections, connected) = {
        let mailbox = Arc::clone(&mailbox);
        tokio::task::spawn_blocking(move || {
            let ok = connections.connect(kind, mailbox);
            (connections, ok)
        })
        .await
        .context("connect task panicked")?
    };
    if !connected {
        bail!("failed to connect {} transport", kind);
    }

    let mut sigint = unix::signal(SignalKind::interrupt())?;
    let mut sigterm = unix::signal(SignalKind::terminate())?;
    let mut ticker = tokio::time::interval(Duration::from_millis(args.poll_ms.max(1)));

    loop {
        tokio::select! {
            _ = sigint.recv() => {
                info!("Received SIGINT.");
                break;
            }
            _ = sigterm.recv() => {
                info!("Received SIGTERM.");
                break;
            }
            _ = ticker.tick() => {
                match mailbox.try_take() {
                    Ok(Some(frame)) => print_frame(&frame, args.json)?,
                    Ok(None) => {}
                    Err(MailboxError::Closed) => {
                        warn!("Mailbox closed");
                        break;
                    }
                }
                if connections.active().is_none() {
                    error!(transport = %kind, "Worker exited");
                    break;
                }
            }
        }
    }

    let stopped = tokio::task::spawn_blocking(move || connections.disconnect_all())
        .await
        .context("disconnect task panicked")?;
    if !stopped {
        bail!("{} worker did not stop cleanly", kind);
    }

    info!("Exiting.");
    Ok(())
}
