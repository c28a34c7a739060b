//! Socket workers around the translation engine
//!
//! One receive task per attachment point feeds frames to the engine and
//! carries out the returned disposition. One more task per kernel fallback
//! interface sends what the kernel emits back out of its attachment point.

use super::{AfPacketSocket, Capture};
use crate::dataplane::{Disposition, NaptEngine, Side};
use crate::{Error, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

/// Large enough for frames merged by receive offload
const RECV_BUFFER_SIZE: usize = 65536;

/// A bound socket and the interface it belongs to
#[derive(Debug)]
pub struct Port<C> {
    pub name: String,
    pub socket: C,
}

/// Sockets of one attachment point
#[derive(Debug)]
pub struct Endpoint<C> {
    pub port: Port<C>,
    pub fallback: Option<Port<C>>,
}

/// Sockets of one port pair
#[derive(Debug)]
pub struct PairSockets<C> {
    pub public: Endpoint<C>,
    pub private: Endpoint<C>,
}

impl<C> PairSockets<C> {
    /// Sockets of the attachment point on `side`
    pub fn endpoint(&self, side: Side) -> &Endpoint<C> {
        match side {
            Side::Public => &self.public,
            Side::Private => &self.private,
        }
    }
}

pub struct Runner<C> {
    engine: Arc<NaptEngine>,
    pairs: Vec<PairSockets<C>>,
}

impl Runner<AfPacketSocket> {
    /// Bind every attachment point and fallback interface of `engine`
    pub fn bind(engine: Arc<NaptEngine>) -> Result<Self> {
        let bind = |name: &str| -> Result<Port<AfPacketSocket>> {
            info!(interface = name, "binding");
            Ok(Port {
                name: name.to_string(),
                socket: AfPacketSocket::bind(name)?,
            })
        };

        let mut pairs = Vec::with_capacity(engine.pairs().len());
        for pair in engine.pairs() {
            let endpoint = |side: Side| -> Result<Endpoint<AfPacketSocket>> {
                let point = pair.attachment(side);
                Ok(Endpoint {
                    port: bind(&point.name)?,
                    fallback: point.kernel_fallback.as_deref().map(bind).transpose()?,
                })
            };
            pairs.push(PairSockets {
                public: endpoint(Side::Public)?,
                private: endpoint(Side::Private)?,
            });
        }
        Ok(Self::new(engine, pairs))
    }
}

impl<C: Capture + 'static> Runner<C> {
    /// Wrap already bound sockets; fallback interfaces are registered for metrics
    pub fn new(engine: Arc<NaptEngine>, pairs: Vec<PairSockets<C>>) -> Self {
        for pair in &pairs {
            for side in [Side::Public, Side::Private] {
                if let Some(fallback) = &pair.endpoint(side).fallback {
                    engine.metrics().register_interface(&fallback.name);
                }
            }
        }
        Self { engine, pairs }
    }

    /// Engine the workers feed
    pub fn engine(&self) -> &Arc<NaptEngine> {
        &self.engine
    }

    /// Spawn all workers and wait for the first one to fail
    pub async fn run(self: Arc<Self>) -> Result<()> {
        let mut tasks = JoinSet::new();
        for (index, pair) in self.pairs.iter().enumerate() {
            for side in [Side::Public, Side::Private] {
                let runner = Arc::clone(&self);
                tasks.spawn(async move { runner.attachment_loop(index, side).await });
                if pair.endpoint(side).fallback.is_some() {
                    let runner = Arc::clone(&self);
                    tasks.spawn(async move { runner.fallback_loop(index, side).await });
                }
            }
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Ok(())) => {}
                Ok(Err(e)) => return Err(e),
                Err(e) => return Err(Error::Io(std::io::Error::other(e))),
            }
        }
        Ok(())
    }

    async fn attachment_loop(&self, pair: usize, side: Side) -> Result<()> {
        let port = &self.sockets(pair)?.endpoint(side).port;
        let mut buf = vec![0u8; RECV_BUFFER_SIZE];
        loop {
            match port.socket.recv(&mut buf).await {
                Ok(rx) => {
                    self.engine.metrics().record_rx(&port.name, rx.len);
                    self.handle_frame(pair, side, &mut buf[..rx.len]).await;
                }
                Err(e) => {
                    error!(interface = %port.name, error = %e, "receive error");
                    self.engine.metrics().record_rx_error(&port.name);
                }
            }
        }
    }

    async fn fallback_loop(&self, pair: usize, side: Side) -> Result<()> {
        let endpoint = self.sockets(pair)?.endpoint(side);
        let Some(fallback) = &endpoint.fallback else {
            return Ok(());
        };
        let mut buf = vec![0u8; RECV_BUFFER_SIZE];
        loop {
            match fallback.socket.recv(&mut buf).await {
                Ok(rx) => {
                    self.engine.metrics().record_rx(&fallback.name, rx.len);
                    self.transmit(&endpoint.port, &buf[..rx.len]).await;
                }
                Err(e) => {
                    error!(interface = %fallback.name, error = %e, "receive error");
                    self.engine.metrics().record_rx_error(&fallback.name);
                }
            }
        }
    }

    fn sockets(&self, pair: usize) -> Result<&PairSockets<C>> {
        self.pairs
            .get(pair)
            .ok_or_else(|| Error::Config(format!("no sockets for port pair {}", pair)))
    }

    /// Run one frame through the engine and send whatever it asks for
    pub async fn handle_frame(&self, pair: usize, side: Side, frame: &mut [u8]) {
        let Ok(sockets) = self.sockets(pair) else {
            return;
        };
        match self.engine.process(pair, side, frame) {
            Disposition::Forward { side: out } => {
                self.transmit(&sockets.endpoint(out).port, frame).await;
            }
            Disposition::Drop(reason) => {
                debug!(pair, %side, %reason, "dropped");
            }
            Disposition::ToKernel { side: at } => match &sockets.endpoint(at).fallback {
                Some(fallback) => self.transmit(fallback, frame).await,
                None => warn!(pair, side = %at, "kernel-bound frame without a fallback interface"),
            },
            Disposition::ArpPending { side: out, request } => {
                self.transmit(&sockets.endpoint(out).port, &request).await;
            }
            Disposition::Reply { side: out, frame: reply } => {
                self.transmit(&sockets.endpoint(out).port, &reply).await;
            }
        }
    }

    async fn transmit(&self, port: &Port<C>, frame: &[u8]) {
        match port.socket.send(frame).await {
            Ok(len) => self.engine.metrics().record_tx(&port.name, len),
            Err(e) => {
                warn!(interface = %port.name, error = %e, "send failed");
                self.engine.metrics().record_tx_error(&port.name);
            }
        }
    }

    /// Log the counters every `period`
    pub async fn report_metrics(&self, period: Duration) {
        let mut interval = tokio::time::interval(period);
        interval.tick().await;
        loop {
            interval.tick().await;
            let metrics = self.engine.metrics();
            metrics.set_active_connections(self.engine.active_connections());
            let summary = metrics
                .export()
                .into_iter()
                .filter(|(_, value)| *value > 0)
                .map(|(key, value)| format!("{key}={value}"))
                .collect::<Vec<_>>()
                .join(" ");
            info!(%summary, "metrics");
        }
    }
}
