//! Connection-layer scenarios: sessions must be served on their own threads
//! so an active session never blocks the next engine.

use anyhow::{bail, Result};
use flowproxy::config::Config;
use flowproxy::mapper::MapperRegistry;
use flowproxy::proxy::Proxy;
use std::io::{ErrorKind, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::Arc;
use std::time::{Duration, Instant};

const TIMEOUT: Duration = Duration::from_secs(5);

/// Accept one connection, failing instead of hanging when none arrives.
fn accept_within(listener: &TcpListener, timeout: Duration) -> Result<TcpStream> {
    listener.set_nonblocking(true)?;
    let deadline = Instant::now() + timeout;
    loop {
        match listener.accept() {
            Ok((stream, _)) => {
                stream.set_nonblocking(false)?;
                return Ok(stream);
            }
            Err(err) if err.kind() == ErrorKind::WouldBlock => {
                if Instant::now() >= deadline {
                    bail!("no connection within {timeout:?}");
                }
                std::thread::sleep(Duration::from_millis(10));
            }
            Err(err) => return Err(err.into()),
        }
    }
}

fn pipe_frame(engine: &mut TcpStream, ide: &mut TcpStream, frame: &[u8]) -> Result<Vec<u8>> {
    engine.write_all(frame)?;
    ide.set_read_timeout(Some(TIMEOUT))?;
    let mut buf = vec![0u8; frame.len()];
    ide.read_exact(&mut buf)?;
    Ok(buf)
}

#[test]
fn test_sessions_are_served_concurrently() -> Result<()> {
    let ide_listener = TcpListener::bind("127.0.0.1:0")?;
    let ide_addr = ide_listener.local_addr()?;
    let proxy_listener = TcpListener::bind("127.0.0.1:0")?;
    let proxy_addr = proxy_listener.local_addr()?;

    let config = Config {
        framework: "dummy".to_string(),
        ..Config::default()
    };
    let proxy = Arc::new(Proxy::new(config, MapperRegistry::with_defaults(), ide_addr));
    std::thread::spawn(move || {
        let _ = proxy.run(proxy_listener);
    });

    // First engine connects and its session stays open.
    let mut first_engine = TcpStream::connect(proxy_addr)?;
    let mut first_ide = accept_within(&ide_listener, TIMEOUT)?;

    // While the first session is alive, a second engine must get its own
    // session (and its own IDE connection) too.
    let mut second_engine = TcpStream::connect(proxy_addr)?;
    let mut second_ide = accept_within(&ide_listener, TIMEOUT)?;

    // Traffic flows on the second session while the first one is still open.
    let frame = b"5\x00hello\x00";
    assert_eq!(
        pipe_frame(&mut second_engine, &mut second_ide, frame)?,
        frame.to_vec()
    );

    // The first session was not disturbed by the second one.
    assert_eq!(
        pipe_frame(&mut first_engine, &mut first_ide, frame)?,
        frame.to_vec()
    );
    Ok(())
}
