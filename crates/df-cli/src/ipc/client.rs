//! Control client implementation

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;

use df_core::control::{ActionRequest, ControlRequest, ControlResponse, StreamLine};

/// Client for communicating with the orchestrator daemon
pub struct FleetClient {
    address: String,
    connection: Option<(BufReader<OwnedReadHalf>, OwnedWriteHalf)>,
}

impl FleetClient {
    pub fn with_address(address: String) -> Self {
        Self {
            address,
            connection: None,
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    /// Connect if not already connected
    pub async fn connect(&mut self) -> Result<()> {
        if self.connection.is_some() {
            return Ok(());
        }

        tracing::debug!("Connecting to orchestrator at {}", self.address);

        let stream = TcpStream::connect(&self.address).await.with_context(|| {
            format!(
                "Failed to connect to orchestrator at {}. Is it running?",
                self.address
            )
        })?;
        let (reader, writer) = stream.into_split();
        self.connection = Some((BufReader::new(reader), writer));
        Ok(())
    }

    /// Check whether the orchestrator answers
    pub async fn ping(&mut self) -> bool {
        matches!(self.request(ControlRequest::Ping).await, Ok(r) if r.success)
    }

    /// Send one request and wait for its response
    pub async fn request(&mut self, request: ControlRequest) -> Result<ControlResponse> {
        self.connect().await?;
        self.write_request(&request).await?;
        self.read_line().await
    }

    /// Run a command action, handing each output line to `on_line`
    ///
    /// Returns the sentinel that ended the stream.
    pub async fn stream<F>(&mut self, request: ActionRequest, mut on_line: F) -> Result<StreamLine>
    where
        F: FnMut(&str),
    {
        self.connect().await?;
        self.write_request(&ControlRequest::Stream(request)).await?;

        loop {
            match self.read_line::<StreamLine>().await? {
                StreamLine::Chunk { text } => on_line(&text),
                sentinel => return Ok(sentinel),
            }
        }
    }

    /// Ask the orchestrator to stop
    pub async fn shutdown(&mut self) -> Result<()> {
        let response = self.request(ControlRequest::Shutdown).await?;
        self.connection = None;
        if response.success {
            Ok(())
        } else {
            anyhow::bail!("{}", response.message)
        }
    }

    async fn write_request(&mut self, request: &ControlRequest) -> Result<()> {
        let (_, writer) = self
            .connection
            .as_mut()
            .context("Not connected to orchestrator")?;

        let mut json = serde_json::to_string(request)?;
        json.push('\n');
        writer.write_all(json.as_bytes()).await?;
        writer.flush().await?;
        Ok(())
    }

    async fn read_line<T: DeserializeOwned>(&mut self) -> Result<T> {
        let (reader, _) = self
            .connection
            .as_mut()
            .context("Not connected to orchestrator")?;

        let mut line = String::new();
        if reader.read_line(&mut line).await? == 0 {
            self.connection = None;
            anyhow::bail!("Orchestrator closed the connection");
        }
        serde_json::from_str(&line).context("Failed to parse orchestrator response")
    }
}
