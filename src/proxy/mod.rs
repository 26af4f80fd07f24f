//! Connection handling.
//!
//! The debug engine connects to the proxy, the proxy dials the IDE, and two
//! pump threads forward traffic between them. Every command is rewritten
//! toward cache paths, every response back toward original source paths.

use crate::config::Config;
use crate::dbgp::DbgpStream;
use crate::mapper::{MapperRegistry, PathMapper};
use crate::pathmapping::PathMapping;
use anyhow::{anyhow, Context};
use log::{info, warn};
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;

pub struct Proxy {
    config: Config,
    registry: MapperRegistry,
    mapping: Arc<PathMapping>,
    ide_addr: SocketAddr,
}

impl Proxy {
    pub fn new(config: Config, registry: MapperRegistry, ide_addr: SocketAddr) -> Self {
        Proxy {
            config,
            registry,
            mapping: Arc::new(PathMapping::new()),
            ide_addr,
        }
    }

    /// Accept debug engine connections forever. Each connection becomes one
    /// session served on its own thread, so a long-running (or stuck) session
    /// never delays the next engine. All sessions share the path mapping
    /// store, so mappings survive reconnects.
    pub fn run(self: &Arc<Self>, listener: TcpListener) -> anyhow::Result<()> {
        let listen = listener.local_addr()?;
        info!(target: "proxy", "listening on {listen}, forwarding to IDE at {}", self.ide_addr);

        loop {
            let (stream, peer) = match listener.accept() {
                Ok(v) => v,
                Err(err) => {
                    warn!(target: "proxy", "accept failed: {err:#}");
                    continue;
                }
            };
            info!(target: "proxy", "debug engine connected: {peer}");
            let proxy = Arc::clone(self);
            std::thread::spawn(move || {
                if let Err(err) = proxy.serve(stream) {
                    warn!(target: "proxy", "session ended with error: {err:#}");
                } else {
                    info!(target: "proxy", "session finished: {peer}");
                }
            });
        }
    }

    /// Run one debug session to completion. A rewrite error is scoped to
    /// this session: it never takes down other sessions or the process.
    fn serve(&self, engine: TcpStream) -> anyhow::Result<()> {
        let mapper = self
            .registry
            .create(
                &self.config.framework,
                self.config.clone(),
                self.mapping.clone(),
            )
            .ok_or_else(|| anyhow!("unknown framework `{}`", self.config.framework))?;

        let ide = TcpStream::connect(self.ide_addr)
            .with_context(|| format!("connect IDE at {}", self.ide_addr))?;

        // Handles used to unblock the opposite pump when one side closes.
        let engine_ctl = engine.try_clone()?;
        let ide_ctl = ide.try_clone()?;

        let ide_rx = DbgpStream::new(ide.try_clone()?)?;
        let engine_tx = DbgpStream::new(engine.try_clone()?)?;
        let engine_rx = DbgpStream::new(engine)?;
        let ide_tx = DbgpStream::new(ide)?;

        let mapper = mapper.as_ref();
        std::thread::scope(|scope| {
            let commands = scope.spawn(|| {
                let res = pump_commands(ide_rx, engine_tx, mapper);
                let _ = engine_ctl.shutdown(Shutdown::Both);
                res
            });
            let responses = scope.spawn(|| {
                let res = pump_responses(engine_rx, ide_tx, mapper);
                let _ = ide_ctl.shutdown(Shutdown::Both);
                res
            });

            let commands = commands
                .join()
                .unwrap_or_else(|_| Err(anyhow!("command pump panicked")));
            let responses = responses
                .join()
                .unwrap_or_else(|_| Err(anyhow!("response pump panicked")));
            commands.and(responses)
        })
    }
}

fn pump_commands(
    mut ide: DbgpStream,
    mut engine: DbgpStream,
    mapper: &dyn PathMapper,
) -> anyhow::Result<()> {
    while let Some(command) = ide.read_command()? {
        let command = mapper.apply_to_outbound(&command);
        engine.write_command(&command)?;
    }
    info!(target: "proxy", "IDE closed the connection");
    Ok(())
}

fn pump_responses(
    mut engine: DbgpStream,
    mut ide: DbgpStream,
    mapper: &dyn PathMapper,
) -> anyhow::Result<()> {
    while let Some(frame) = engine.read_response()? {
        let frame = match mapper.apply_to_inbound(&frame) {
            Ok(frame) => frame,
            Err(err) if err.is_fatal() => {
                return Err(anyhow::Error::new(err).context("rewrite response"));
            }
            Err(err) => {
                warn!(target: "proxy", "rewrite failed, forwarding unmodified: {err:#}");
                frame
            }
        };
        ide.write_frame(&frame)?;
    }
    info!(target: "proxy", "debug engine closed the connection");
    Ok(())
}
