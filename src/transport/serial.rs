//! Serial record link over tokio-serial.
//!
//! Both the BT-classic sensor (through an RFCOMM serial port) and the USB
//! board speak the same protocol: the host writes one trigger byte and the
//! device answers with one newline-terminated JSON record.

use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncWriteExt, ReadHalf, WriteHalf};
use tokio_serial::{SerialPortBuilderExt, SerialStream};
use tokio_stream::StreamExt;
use tokio_util::codec::{FramedRead, LinesCodec};

use super::{Open, RecordLink};
use crate::{
    config::SerialConfig,
    error::{Error, Result},
    tracing::prelude::*,
};

/// Longest record accepted before the line is rejected as malformed.
///
/// A full USB record is about 400 bytes.
const MAX_RECORD_LEN: usize = 4096;

pub struct SerialLink {
    port: String,
    writer: WriteHalf<SerialStream>,
    reader: FramedRead<ReadHalf<SerialStream>, LinesCodec>,
}

impl SerialLink {
    /// Open the configured port. Must be called within a tokio runtime.
    pub fn open(config: &SerialConfig) -> Result<Self> {
        let stream = tokio_serial::new(&config.port, config.baud_rate)
            .open_native_async()
            .map_err(|e| Error::LinkUnavailable(format!("{}: {}", config.port, e)))?;

        debug!(port = %config.port, baud = config.baud_rate, "Serial port opened");

        let (reader, writer) = tokio::io::split(stream);
        Ok(Self {
            port: config.port.clone(),
            writer,
            reader: FramedRead::new(reader, LinesCodec::new_with_max_length(MAX_RECORD_LEN)),
        })
    }
}

#[async_trait]
impl RecordLink for SerialLink {
    async fn request(&mut self, trigger: u8, timeout: Duration) -> Result<String> {
        self.writer.write_all(&[trigger]).await?;
        self.writer.flush().await?;

        match tokio::time::timeout(timeout, self.reader.next()).await {
            Ok(Some(Ok(line))) => {
                trace!(port = %self.port, len = line.len(), "Record received");
                Ok(line)
            }
            Ok(Some(Err(e))) => Err(e.into()),
            Ok(None) => Err(Error::LinkClosed),
            Err(_) => Err(Error::LinkTimeout(timeout)),
        }
    }
}

#[async_trait]
impl Open for SerialConfig {
    type Link = SerialLink;

    async fn open(self) -> Result<SerialLink> {
        SerialLink::open(&self)
    }
}
