//! In-memory port for driver tests.

use std::collections::VecDeque;
use std::fmt;
use std::io;
use std::time::Duration;

use super::Port;

type Responder = Box<dyn FnMut(&[u8]) -> Vec<u8> + Send>;

/// A port that answers each write through a scripted responder.
pub(crate) struct ScriptedPort {
    rx: VecDeque<u8>,
    written: Vec<Vec<u8>>,
    responder: Responder,
    baud_rate: u32,
    rx_timeout: Duration,
    baud_history: Vec<u32>,
}

impl fmt::Debug for ScriptedPort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScriptedPort")
            .field("pending", &self.rx.len())
            .field("writes", &self.written.len())
            .field("baud_rate", &self.baud_rate)
            .finish_non_exhaustive()
    }
}

impl ScriptedPort {
    /// A port whose peer answers every write with `responder(write)`.
    pub(crate) fn new(responder: impl FnMut(&[u8]) -> Vec<u8> + Send + 'static) -> Self {
        Self {
            rx: VecDeque::new(),
            written: Vec::new(),
            responder: Box::new(responder),
            baud_rate: 4800,
            rx_timeout: Duration::from_millis(50),
            baud_history: Vec::new(),
        }
    }

    /// A port whose peer never answers.
    pub(crate) fn silent() -> Self {
        Self::new(|_| Vec::new())
    }

    /// Queue bytes as if the peer had sent them.
    pub(crate) fn push_rx(&mut self, data: &[u8]) {
        self.rx.extend(data);
    }

    /// Every write, in order.
    pub(crate) fn writes(&self) -> &[Vec<u8>] {
        &self.written
    }

    /// All written bytes concatenated and decoded lossily.
    pub(crate) fn written_text(&self) -> String {
        let bytes: Vec<u8> = self.written.concat();
        String::from_utf8_lossy(&bytes).into_owned()
    }

    /// Baud rates set through the port, in order.
    pub(crate) fn baud_history(&self) -> &[u32] {
        &self.baud_history
    }
}

impl Port for ScriptedPort {
    fn write(&mut self, data: &[u8]) -> io::Result<()> {
        self.written.push(data.to_vec());
        let reply = (self.responder)(data);
        self.rx.extend(reply);
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.rx.is_empty() {
            std::thread::sleep(self.rx_timeout.min(Duration::from_millis(1)));
            return Ok(0);
        }
        let n = buf.len().min(self.rx.len());
        for (slot, byte) in buf.iter_mut().zip(self.rx.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }

    fn baud_rate(&self) -> u32 {
        self.baud_rate
    }

    fn set_baud_rate(&mut self, baud_rate: u32) -> io::Result<()> {
        self.baud_rate = baud_rate;
        self.baud_history.push(baud_rate);
        Ok(())
    }

    fn rx_timeout(&self) -> Duration {
        self.rx_timeout
    }

    fn set_rx_timeout(&mut self, timeout: Duration) -> io::Result<()> {
        self.rx_timeout = timeout;
        Ok(())
    }

    fn flush_input(&mut self) -> io::Result<()> {
        self.rx.clear();
        Ok(())
    }
}
